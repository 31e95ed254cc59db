//! Error types for revwatch-sync.

use thiserror::Error;

use revwatch_core::IdentifierError;
use revwatch_store::StoreError;

/// Failures of a single upstream fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS, or non-2xx status.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Body is not JSON or has no string `sha` field.
    #[error("unexpected response from {url}: {message}")]
    Format { url: String, message: String },

    #[error("{0}")]
    InvalidIdentifier(#[from] IdentifierError),
}

/// Why a reconciliation stopped. Each variant names the step that failed;
/// nothing is written to the store after any of them except `StorageWrite`,
/// which is the write itself.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("request to {url} failed: {message}")]
    UpstreamFetch { url: String, message: String },

    #[error("unexpected response from {url}: {message}")]
    UpstreamFormat { url: String, message: String },

    #[error("{0}")]
    InvalidIdentifier(#[source] IdentifierError),

    #[error("{0}")]
    StorageQuery(#[source] StoreError),

    #[error("{0}")]
    StorageWrite(#[source] StoreError),
}

impl ReconcileError {
    /// Short step name, used in logs and summaries.
    pub fn stage(&self) -> &'static str {
        match self {
            ReconcileError::UpstreamFetch { .. } => "fetch",
            ReconcileError::UpstreamFormat { .. } => "parse",
            ReconcileError::InvalidIdentifier(_) => "validate",
            ReconcileError::StorageQuery(_) => "query",
            ReconcileError::StorageWrite(_) => "write",
        }
    }
}

impl From<FetchError> for ReconcileError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transport { url, message } => ReconcileError::UpstreamFetch { url, message },
            FetchError::Format { url, message } => ReconcileError::UpstreamFormat { url, message },
            FetchError::InvalidIdentifier(err) => ReconcileError::InvalidIdentifier(err),
        }
    }
}
