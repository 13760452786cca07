//! Ingestion sources
//!
//! A source is a named block of CSV text: a file in the configured CSV
//! directory or an uploaded in-memory buffer. The identifier is the
//! watermark key; the event name is the identifier without its extension.

use super::error::IngestError;
use std::path::{Path, PathBuf};

/// Extension of files picked up from a CSV directory
pub const CSV_EXTENSION: &str = "csv";

#[derive(Debug, Clone)]
pub enum Source {
    File { path: PathBuf },
    Buffer { name: String, bytes: Vec<u8> },
}

impl Source {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Source::File { path: path.into() }
    }

    pub fn buffer(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Source::Buffer {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Stable watermark key
    pub fn id(&self) -> String {
        match self {
            Source::File { path } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            Source::Buffer { name, .. } => name.clone(),
        }
    }

    /// Event the source's registrations belong to
    pub fn event_name(&self) -> String {
        let id = self.id();
        Path::new(&id)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or(id)
    }

    /// Decoded text content
    pub async fn read(&self) -> Result<String, IngestError> {
        match self {
            Source::File { path } => tokio::fs::read_to_string(path).await.map_err(|e| {
                IngestError::SourceUnavailable {
                    source_id: self.id(),
                    reason: format!("{}: {}", path.display(), e),
                }
            }),
            Source::Buffer { name, bytes } => {
                String::from_utf8(bytes.clone()).map_err(|e| IngestError::SourceUnavailable {
                    source_id: name.clone(),
                    reason: format!("not valid UTF-8: {}", e),
                })
            }
        }
    }
}

/// List the regular files in `dir` with the given extension, sorted by name
pub async fn enumerate_directory(dir: &Path, extension: &str) -> Result<Vec<Source>, IngestError> {
    let unavailable = |e: std::io::Error| IngestError::SourceUnavailable {
        source_id: dir.display().to_string(),
        reason: e.to_string(),
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(unavailable)?;
    let mut paths = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
        let path = entry.path();
        // Follows symlinks; a dangling link is skipped
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        let matches = path
            .extension()
            .map(|ext| ext == extension)
            .unwrap_or(false);

        if is_file && matches {
            paths.push(path);
        }
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(paths.into_iter().map(Source::file).collect())
}
