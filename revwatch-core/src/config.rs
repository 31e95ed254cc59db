//! YAML configuration at `~/.revwatch/config.yaml`.
//!
//! # API pattern
//!
//! Every function that touches disk takes the home directory explicitly
//! (`load_at(home)`, …); callers resolve it once with [`paths::home`] and
//! tests pass a `TempDir`.
//!
//! A missing config file is not an error: [`load_at`] returns
//! [`Config::default`]. The upstream API token is never stored here; only the
//! name of the environment variable holding it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths::{self, config_path};
use crate::types::Upstream;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_TOKEN_ENV: &str = "REVWATCH_GITHUB_TOKEN";
pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8085";
pub const DEFAULT_HTTP_PATH: &str = "/update-revision";

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upstream: Upstream,
    /// Base URL of the hosting API, without trailing path.
    pub api_base: String,
    /// Environment variable that holds the API token, if any.
    pub token_env: String,
    /// Upstream request timeout. `None` leaves the transport default in place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Scheduler period for the daemon.
    pub interval_secs: u64,
    pub http: HttpConfig,
}

/// Where the daemon serves the reconcile trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: Upstream::default(),
            api_base: DEFAULT_API_BASE.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            timeout_secs: None,
            interval_secs: DEFAULT_INTERVAL_SECS,
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_HTTP_BIND.to_string(),
            path: DEFAULT_HTTP_PATH.to_string(),
        }
    }
}

impl Config {
    /// Full URL of the "latest commit on branch" endpoint.
    pub fn commits_url(&self) -> String {
        self.upstream.commits_url(&self.api_base)
    }

    /// Token read from the environment variable named by `token_env`.
    /// Empty values count as unset.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("upstream.owner", &self.upstream.owner),
            ("upstream.repo", &self.upstream.repo),
            ("upstream.branch", &self.upstream.branch),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api_base must be an http(s) URL, got '{}'",
                self.api_base
            )));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "interval_secs must be greater than zero".to_string(),
            ));
        }
        if !self.http.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "http.path must start with '/', got '{}'",
                self.http.path
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate `<home>/.revwatch/config.yaml`, or defaults if absent.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path(home);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    let config: Config =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// 3. Save
// ---------------------------------------------------------------------------

/// Write flow: serialize → `config.yaml.tmp` → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    config.validate()?;
    let root = paths::revwatch_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }
    let path = config_path(home);
    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml)?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Write `config` unless a config file already exists and `force` is false.
pub fn init_at(home: &Path, config: &Config, force: bool) -> Result<(), ConfigError> {
    let path = config_path(home);
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists { path });
    }
    save_at(home, config)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}
