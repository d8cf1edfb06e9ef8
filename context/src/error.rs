use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = MemoryError> = std::result::Result<T, E>;

/// Failures surfaced by the memory core.
///
/// A session with no record is not an error; it reads as an empty history.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The stored blob for a session could not be decoded. The row is left untouched.
    #[error("malformed record for session '{session_key}': {source}")]
    MalformedRecord {
        session_key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Messages could not be serialized for persistence.
    #[error("failed to encode messages for session '{session_key}': {source}")]
    Encode {
        session_key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The SQLite store rejected an operation.
    #[error("storage unavailable: {context}: {source}")]
    StorageUnavailable {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The database location could not be prepared on disk.
    #[error("storage unavailable: {context} ({}): {source}", path.display())]
    StorageIo {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking storage task could not complete (panicked or poisoned connection).
    #[error("storage task failed: {0}")]
    StorageTask(String),
}

impl MemoryError {
    pub(crate) fn storage(context: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Self {
        let context = context.into();
        move |source| Self::StorageUnavailable { context, source }
    }

    pub(crate) fn io(
        context: impl Into<String>,
        path: &std::path::Path,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        let path = path.to_path_buf();
        move |source| Self::StorageIo {
            context,
            path,
            source,
        }
    }

    /// True for the storage-layer variants (as opposed to data corruption).
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. } | Self::StorageIo { .. } | Self::StorageTask(_)
        )
    }
}
