//! Domain types for tracked upstream revisions.
//!
//! All types are serializable/deserializable via serde; [`CommitSha`] is
//! validated on every construction path, including deserialization.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IdentifierError;

/// Length of a full commit hash in characters.
pub const SHA_LEN: usize = 40;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A validated 40-character hexadecimal commit hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitSha(String);

impl CommitSha {
    /// Validate `value` as a commit hash.
    ///
    /// The length is checked before the alphabet so that a truncated or
    /// padded hash is reported as such.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        let len = value.chars().count();
        if len != SHA_LEN {
            return Err(IdentifierError::Length { len, value });
        }
        if hex::decode(&value).is_err() {
            return Err(IdentifierError::NotHex { value });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First seven characters, as shown by most git tooling.
    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CommitSha {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CommitSha {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CommitSha> for String {
    fn from(sha: CommitSha) -> Self {
        sha.0
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One observed state of the tracked upstream branch.
///
/// Records are append-only: `number` starts at 0 and grows by exactly one per
/// distinct `sha` observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub sha: CommitSha,
    pub number: u64,
    pub created_at: DateTime<Utc>,
}

impl RevisionRecord {
    /// The record that would follow `previous` (or the first-ever record).
    ///
    /// `now` is clamped so a new record is never older than its predecessor.
    pub fn next_after(
        previous: Option<&RevisionRecord>,
        sha: CommitSha,
        now: DateTime<Utc>,
    ) -> Self {
        match previous {
            Some(prev) => Self {
                sha,
                number: prev.number + 1,
                created_at: now.max(prev.created_at),
            },
            None => Self {
                sha,
                number: 0,
                created_at: now,
            },
        }
    }
}

impl fmt::Display for RevisionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{SHA:{} Number:{} CreatedAt:{}}}",
            self.sha,
            self.number,
            self.created_at.to_rfc3339()
        )
    }
}

/// The repository branch whose head is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            owner: "w3c".to_string(),
            repo: "web-platform-tests".to_string(),
            branch: "master".to_string(),
        }
    }
}

impl Upstream {
    /// `{api_base}/repos/{owner}/{repo}/commits/{branch}`
    pub fn commits_url(&self, api_base: &str) -> String {
        format!(
            "{}/repos/{}/{}/commits/{}",
            api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.branch
        )
    }

    /// File-name-safe key, one store per tracked branch.
    pub fn slug(&self) -> String {
        format!("{}__{}__{}", self.owner, self.repo, self.branch).replace('/', "_")
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}
