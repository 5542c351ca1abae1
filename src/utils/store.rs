//! Durable storage of crawl documents.
//!
//! Every write creates the parent directory first and then replaces the target
//! in a single rename, so readers only ever see complete files.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::sources::SourceError;

/// Serialize `value` as YAML to `path`
pub fn save_yaml<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<(), SourceError> {
    let content = serde_yaml::to_string(value)?;
    save_bytes(content.as_bytes(), path)?;
    tracing::debug!("Saved {}", path.display());
    Ok(())
}

/// Read a YAML document from `path`
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, SourceError> {
    let content = fs::read_to_string(path)?;
    let value = serde_yaml::from_str(&content)
        .map_err(|e| SourceError::Serialization(format!("{}: {}", path.display(), e)))?;
    tracing::debug!("Loaded {}", path.display());
    Ok(value)
}

/// Atomically write raw bytes to `path`
pub fn save_bytes(bytes: &[u8], path: &Path) -> Result<(), SourceError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| SourceError::Io(e.error))?;
    Ok(())
}
