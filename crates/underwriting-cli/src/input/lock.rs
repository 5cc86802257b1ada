use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use tracing::debug;

/// Exclusive advisory lock on the `<ledger>.lock` sidecar. Held from load
/// until the ledger is written back; released when dropped.
pub struct LedgerLock {
    _file: File,
    path: PathBuf,
}

impl LedgerLock {
    /// Blocks until no other process holds the ledger.
    pub fn acquire(ledger: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let path = lock_path(ledger);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| format!("Failed to open lock '{}': {}", path.display(), e))?;
        file.lock_exclusive()
            .map_err(|e| format!("Failed to lock '{}': {}", path.display(), e))?;
        debug!(path = %path.display(), "ledger lock acquired");
        Ok(Self { _file: file, path })
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "ledger lock released");
    }
}

pub fn lock_path(ledger: &str) -> PathBuf {
    PathBuf::from(format!("{ledger}.lock"))
}
