use std::io::Write;
use std::path::PathBuf;
use anyhow::{anyhow, Context};
use reqwest::blocking::Response;

/// Passes successful responses through, turns the rest into `HTTP <status>: <body>` errors.
pub(crate) fn check_status(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(anyhow!("HTTP {}: {}", status, body.trim()))
}

/// Writes `bytes` to a new file in the process temp dir and keeps it.
///
/// The caller owns the file from here on.
pub(crate) fn persist_temp(prefix: &str, ext: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    let suffix = format!(".{ext}");
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(&suffix)
        .tempfile()
        .context("Failed to create temp file")?;
    file.write_all(bytes).context("Failed to write temp file")?;
    let (_, path) = file.keep().context("Failed to keep temp file")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_temp_keeps_file() {
        let path = persist_temp("dtv_test_", "png", b"bytes").unwrap();
        assert!(path.starts_with(std::env::temp_dir()));
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(std::fs::read(&path).unwrap(), b"bytes");
        std::fs::remove_file(path).unwrap();
    }
}
