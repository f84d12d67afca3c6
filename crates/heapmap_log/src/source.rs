//! Log sources.
//!
//! Loading the raw buffer is the only asynchronous step; decoding starts
//! after it completes. A failed load is fatal for the session and is not
//! retried.

use async_trait::async_trait;
use bytes::Bytes;
use heapmap_core::CoreError;
use std::path::{Path, PathBuf};

/// Source loading errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// I/O failure while reading the log
    #[error("Failed to read {path}: {error}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        error: std::io::Error,
    },

    /// The source has nothing to load
    #[error("Log {name} is not available")]
    Missing {
        /// Name of the missing log
        name: String,
    },
}

impl From<SourceError> for CoreError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Io { path, error } => CoreError::LogUnavailable {
                origin: path.display().to_string(),
                reason: error.to_string(),
            },
            SourceError::Missing { name } => CoreError::LogUnavailable {
                origin: name,
                reason: "no data".to_string(),
            },
        }
    }
}

/// Collaborator that produces the raw log buffer
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> String;

    /// Fetch the whole log
    async fn load(&self) -> Result<Bytes, SourceError>;
}

/// Log stored in a file
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Source reading the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogSource for FileSource {
    fn name(&self) -> String {
        self.path().display().to_string()
    }

    async fn load(&self) -> Result<Bytes, SourceError> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|error| SourceError::Io {
                path: self.path.clone(),
                error,
            })?;
        tracing::debug!(path = %self.path.display(), bytes = data.len(), "loaded heap log");
        Ok(Bytes::from(data))
    }
}

/// Log already held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    data: Option<Bytes>,
}

impl MemorySource {
    /// Source serving `data` under `name`
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: Some(data.into()),
        }
    }

    /// A source whose load always fails
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }
}

#[async_trait]
impl LogSource for MemorySource {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn load(&self) -> Result<Bytes, SourceError> {
        self.data.clone().ok_or_else(|| SourceError::Missing {
            name: self.name.clone(),
        })
    }
}
