//! Error types for revwatch-core.

use std::path::PathBuf;

use thiserror::Error;

/// A string that cannot name an upstream commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Commit hashes are exactly 40 characters long.
    #[error("expected a 40-character SHA, got {len} characters: {value:?}")]
    Length { len: usize, value: String },

    #[error("SHA contains non-hexadecimal characters: {value:?}")]
    NotHex { value: String },
}

/// All errors that can arise from configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes the file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.revwatch/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("config already exists at {path}; pass --force to overwrite")]
    AlreadyExists { path: PathBuf },

    /// A field holds a value the job cannot run with.
    #[error("invalid config: {0}")]
    Invalid(String),
}
