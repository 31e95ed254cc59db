//! revwatch core library — domain types, configuration, paths, errors.
//!
//! - [`types`] — [`CommitSha`], [`RevisionRecord`], [`Upstream`]
//! - [`config`] — load / save / init of `~/.revwatch/config.yaml`
//! - [`paths`] — on-disk layout under `~/.revwatch/`
//! - [`error`] — [`IdentifierError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use config::{Config, HttpConfig};
pub use error::{ConfigError, IdentifierError};
pub use types::{CommitSha, RevisionRecord, Upstream, SHA_LEN};
