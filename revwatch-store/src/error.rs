//! Error types for revwatch-store.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (save path).
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store file exists but cannot be parsed.
    #[error("corrupt revision store at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Another writer holds the store lock. If no such writer is running,
    /// the lock was left by a crash and the file can be deleted.
    #[error(
        "revision store is locked by another writer (pid {}); remove {} if no writer is running",
        .owner_pid.map_or_else(|| "unknown".to_string(), |pid| pid.to_string()),
        .path.display()
    )]
    Locked { path: PathBuf, owner_pid: Option<u32> },

    /// The latest stored number moved since the caller read it.
    #[error("latest revision changed concurrently: expected {expected:?}, found {found:?}")]
    Conflict {
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// The record's number is not `expected latest + 1`.
    #[error("revision number {got} does not follow the latest (expected {expected})")]
    NonSequential { expected: u64, got: u64 },
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
