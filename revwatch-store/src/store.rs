//! The [`RevisionStore`] trait and the document shared by its implementations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use revwatch_core::{CommitSha, RevisionRecord};

use crate::error::StoreError;

/// Result of a conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written.
    Inserted,
    /// A record with the same SHA already exists; nothing was written.
    AlreadyPresent(RevisionRecord),
}

/// Keyed, append-only revision storage.
///
/// Records are keyed by SHA. Ordering is by `number`.
pub trait RevisionStore: Send + Sync {
    /// The record with the highest number, if any.
    fn latest(&self) -> Result<Option<RevisionRecord>, StoreError>;

    fn get(&self, sha: &CommitSha) -> Result<Option<RevisionRecord>, StoreError>;

    /// Every record, highest number first.
    fn list(&self) -> Result<Vec<RevisionRecord>, StoreError>;

    /// Insert `record` if the store's latest number is still `expected_latest`.
    ///
    /// `expected_latest` is `None` for an empty store. The check and the write
    /// happen atomically with respect to other writers of the same store.
    fn insert(
        &self,
        record: &RevisionRecord,
        expected_latest: Option<u64>,
    ) -> Result<InsertOutcome, StoreError>;
}

// ---------------------------------------------------------------------------
// On-disk / in-memory document
// ---------------------------------------------------------------------------

/// Value stored under each SHA key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRevision {
    pub number: u64,
    pub created_at: DateTime<Utc>,
}

/// All revisions of one tracked branch, keyed by SHA.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionFile {
    #[serde(default)]
    pub revisions: BTreeMap<CommitSha, StoredRevision>,
}

impl RevisionFile {
    pub fn get(&self, sha: &CommitSha) -> Option<RevisionRecord> {
        self.revisions.get(sha).map(|stored| to_record(sha, stored))
    }

    pub fn latest(&self) -> Option<RevisionRecord> {
        self.revisions
            .iter()
            .max_by_key(|(_, stored)| stored.number)
            .map(|(sha, stored)| to_record(sha, stored))
    }

    pub fn list(&self) -> Vec<RevisionRecord> {
        let mut records: Vec<_> = self
            .revisions
            .iter()
            .map(|(sha, stored)| to_record(sha, stored))
            .collect();
        records.sort_by(|a, b| b.number.cmp(&a.number));
        records
    }

    /// Apply the conditional-insert rules in memory.
    ///
    /// A known SHA wins over every other check, so re-inserting an observed
    /// revision is always a no-op.
    pub(crate) fn insert_checked(
        &mut self,
        record: &RevisionRecord,
        expected_latest: Option<u64>,
    ) -> Result<InsertOutcome, StoreError> {
        if let Some(existing) = self.get(&record.sha) {
            return Ok(InsertOutcome::AlreadyPresent(existing));
        }

        let found = self.latest().map(|latest| latest.number);
        if found != expected_latest {
            return Err(StoreError::Conflict {
                expected: expected_latest,
                found,
            });
        }

        let next = expected_latest.map_or(0, |n| n + 1);
        if record.number != next {
            return Err(StoreError::NonSequential {
                expected: next,
                got: record.number,
            });
        }

        self.revisions.insert(
            record.sha.clone(),
            StoredRevision {
                number: record.number,
                created_at: record.created_at,
            },
        );
        Ok(InsertOutcome::Inserted)
    }
}

fn to_record(sha: &CommitSha, stored: &StoredRevision) -> RevisionRecord {
    RevisionRecord {
        sha: sha.clone(),
        number: stored.number,
        created_at: stored.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(c: char) -> CommitSha {
        CommitSha::parse(c.to_string().repeat(40)).unwrap()
    }

    fn record(c: char, number: u64) -> RevisionRecord {
        RevisionRecord {
            sha: sha(c),
            number,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn first_insert_requires_empty_expectation() {
        let mut file = RevisionFile::default();
        let err = file.insert_checked(&record('a', 0), Some(0)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: Some(0),
                found: None
            }
        ));
        assert_eq!(
            file.insert_checked(&record('a', 0), None).unwrap(),
            InsertOutcome::Inserted
        );
    }

    #[test]
    fn stale_expectation_is_a_conflict() {
        let mut file = RevisionFile::default();
        file.insert_checked(&record('a', 0), None).unwrap();
        file.insert_checked(&record('b', 1), Some(0)).unwrap();

        let err = file.insert_checked(&record('c', 1), Some(0)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: Some(0),
                found: Some(1)
            }
        ));
        assert_eq!(file.revisions.len(), 2);
    }

    #[test]
    fn skipped_number_is_rejected() {
        let mut file = RevisionFile::default();
        file.insert_checked(&record('a', 0), None).unwrap();
        let err = file.insert_checked(&record('b', 2), Some(0)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::NonSequential {
                expected: 1,
                got: 2
            }
        ));
    }

    #[test]
    fn known_sha_is_already_present() {
        let mut file = RevisionFile::default();
        let first = record('a', 0);
        file.insert_checked(&first, None).unwrap();

        let outcome = file.insert_checked(&record('a', 1), Some(0)).unwrap();
        assert_eq!(outcome, InsertOutcome::AlreadyPresent(first));
        assert_eq!(file.revisions.len(), 1);
    }

    #[test]
    fn list_orders_by_number_descending() {
        let mut file = RevisionFile::default();
        // SHA order and number order deliberately disagree.
        file.insert_checked(&record('f', 0), None).unwrap();
        file.insert_checked(&record('1', 1), Some(0)).unwrap();
        file.insert_checked(&record('9', 2), Some(1)).unwrap();

        let numbers: Vec<u64> = file.list().iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![2, 1, 0]);
        assert_eq!(file.latest().unwrap().sha, sha('9'));
    }
}
