//! Upstream head lookup.
//!
//! [`RevisionSource`] is the seam the reconciler reads through;
//! [`GitHubSource`] implements it with one GET against the commits API.

use std::io::Read;
use std::time::Duration;

use serde::Deserialize;

use revwatch_core::{CommitSha, Config};

use crate::error::FetchError;

pub const USER_AGENT: &str = concat!("revwatch/", env!("CARGO_PKG_VERSION"));

/// Anything that can report the current upstream head.
pub trait RevisionSource: Send + Sync {
    /// Where the identifier comes from, for reports.
    fn describe(&self) -> String;

    /// Fetch and validate the latest commit identifier.
    fn fetch_latest(&self) -> Result<CommitSha, FetchError>;
}

/// GitHub `GET /repos/{owner}/{repo}/commits/{branch}`.
pub struct GitHubSource {
    agent: ureq::Agent,
    url: String,
    token: Option<String>,
}

impl GitHubSource {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
            url: url.into(),
            token,
        }
    }

    /// Source for the configured upstream; the token comes from the
    /// environment variable named in `config.token_env`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.commits_url(),
            config.token(),
            config.timeout_secs.map(Duration::from_secs),
        )
    }
}

impl std::fmt::Debug for GitHubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSource")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RevisionSource for GitHubSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch_latest(&self) -> Result<CommitSha, FetchError> {
        let mut request = self
            .agent
            .get(&self.url)
            .set("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("token {token}"));
        }

        let response = request.call().map_err(|e| FetchError::Transport {
            url: self.url.clone(),
            message: e.to_string(),
        })?;

        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|e| FetchError::Transport {
                url: self.url.clone(),
                message: format!("failed to read response body: {e}"),
            })?;
        tracing::debug!(url = %self.url, body = %body, "upstream response");

        parse_commit_body(&self.url, &body)
    }
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

/// Extract and validate `sha` from a commits API response body.
pub fn parse_commit_body(url: &str, body: &str) -> Result<CommitSha, FetchError> {
    let commit: CommitResponse = serde_json::from_str(body).map_err(|e| FetchError::Format {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    Ok(CommitSha::parse(commit.sha)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use revwatch_core::IdentifierError;

    const URL: &str = "https://api.github.com/repos/w3c/web-platform-tests/commits/master";

    #[test]
    fn extracts_sha_and_ignores_other_fields() {
        let body = format!(
            r#"{{"sha":"{}","commit":{{"message":"Update"}},"files":[]}}"#,
            "e".repeat(40)
        );
        let sha = parse_commit_body(URL, &body).unwrap();
        assert_eq!(sha.as_str(), "e".repeat(40));
    }

    #[test]
    fn malformed_json_is_a_format_error() {
        let err = parse_commit_body(URL, "<html>rate limited</html>").unwrap_err();
        assert!(matches!(err, FetchError::Format { .. }), "got {err:?}");
    }

    #[test]
    fn missing_sha_is_a_format_error() {
        let err = parse_commit_body(URL, r#"{"message":"Not Found"}"#).unwrap_err();
        match err {
            FetchError::Format { message, .. } => assert!(message.contains("sha")),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn short_sha_is_an_identifier_error() {
        let body = format!(r#"{{"sha":"{}"}}"#, "a".repeat(39));
        let err = parse_commit_body(URL, &body).unwrap_err();
        assert!(matches!(
            err,
            FetchError::InvalidIdentifier(IdentifierError::Length { len: 39, .. })
        ));
    }

    #[test]
    fn debug_output_redacts_token() {
        let source = GitHubSource::new(URL, Some("ghp_secret".to_string()), None);
        let shown = format!("{source:?}");
        assert!(!shown.contains("ghp_secret"));
        assert!(shown.contains("<redacted>"));
    }
}
