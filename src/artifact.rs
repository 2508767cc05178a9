//! The published Atom document on disk.
//!
//! The refresh loop writes through [`ArtifactStore::publish`] and the feed
//! server reads through [`ArtifactStore::read`]. They never share memory; the
//! file path is the only link between them.
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Failed to write '{path}': {source}")]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
#[error("Failed to read '{path}': {source}")]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl ReadError {
    /// Nothing has been published yet.
    pub fn is_missing(&self) -> bool {
        self.source.kind() == std::io::ErrorKind::NotFound
    }
}

/// Handle on the well-known artifact location.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the artifact with `document`.
    ///
    /// Writes to a uniquely named temp file in the same directory, syncs it,
    /// then renames it over the artifact, so readers see either the previous
    /// document or the new one in full.
    pub fn publish(&self, document: &str) -> Result<(), WriteError> {
        let wrap = |source| WriteError {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(wrap)?;
        }

        let temp_path = self.temp_path();
        let result = write_and_rename(&temp_path, &self.path, document.as_bytes());
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        result.map_err(wrap)?;

        tracing::debug!(path = %self.path.display(), bytes = document.len(), "Published artifact");
        Ok(())
    }

    /// Current artifact bytes, exactly as published.
    pub fn read(&self) -> Result<Vec<u8>, ReadError> {
        std::fs::read(&self.path).map_err(|source| ReadError {
            path: self.path.clone(),
            source,
        })
    }

    // The name must not be predictable or shared between concurrent publishers:
    // `create_new` below refuses to follow anything already sitting there.
    fn temp_path(&self) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        self.path.with_file_name(format!(
            ".{}.tmp.{}.{:016x}",
            file_name,
            std::process::id(),
            nanos
        ))
    }
}

fn write_and_rename(temp_path: &Path, dst: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)?;

    temp_file.write_all(content)?;
    temp_file.sync_all()?;
    drop(temp_file);

    // On Windows, rename fails if destination exists
    #[cfg(windows)]
    if dst.exists() {
        std::fs::remove_file(dst)?;
    }

    std::fs::rename(temp_path, dst)
}
