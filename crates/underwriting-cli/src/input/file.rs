use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Read a JSON file and deserialise into a typed struct.
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = existing_file(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let value: T = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    Ok(value)
}

/// Read a JSON file, or fall back to `T::default()` when it does not exist
/// yet. Used for ledgers that are created on first write.
pub fn read_json_or_default<T>(path: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: DeserializeOwned + Default,
{
    if absolute(path)?.exists() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

/// Write pretty JSON via a uniquely named sibling temp file and rename, so a
/// failed write never leaves a truncated ledger behind.
pub fn write_json<T: Serialize>(path: &str, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    let target = absolute(path)?;
    let body = serde_json::to_string_pretty(value)?;
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = target.with_extension(format!("json.{}.{}.tmp", process::id(), seq));
    fs::write(&tmp, body)
        .map_err(|e| format!("Failed to write '{}': {}", tmp.display(), e))?;
    fs::rename(&tmp, &target)
        .map_err(|e| format!("Failed to replace '{}': {}", target.display(), e))?;
    Ok(())
}

fn absolute(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    Ok(if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    })
}

fn existing_file(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let canonical = absolute(path)?;
    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }
    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }
    Ok(canonical)
}
