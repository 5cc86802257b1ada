use serde::de::DeserializeOwned;
use std::io::{self, Read};

/// Deserialise piped JSON from stdin. Returns None when stdin is a TTY or
/// carries nothing.
pub fn read_stdin<T: DeserializeOwned>() -> Result<Option<T>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(trimmed)?))
}

/// `--input` file first, then piped stdin.
pub fn read_input<T: DeserializeOwned>(
    input: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = input {
        return super::file::read_json(path);
    }
    read_stdin()?.ok_or_else(|| format!("{what} required: pass --input <file> or pipe JSON").into())
}
