//! In-process revision store.

use std::sync::{Mutex, MutexGuard};

use revwatch_core::{CommitSha, RevisionRecord};

use crate::error::StoreError;
use crate::store::{InsertOutcome, RevisionFile, RevisionStore};

/// A [`RevisionStore`] held entirely in memory. The mutex makes the
/// conditional insert atomic across threads.
#[derive(Debug, Default)]
pub struct MemoryRevisionStore {
    inner: Mutex<RevisionFile>,
}

impl MemoryRevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records, bypassing the insert checks.
    pub fn with_records(records: impl IntoIterator<Item = RevisionRecord>) -> Self {
        let mut file = RevisionFile::default();
        for record in records {
            file.revisions.insert(
                record.sha,
                crate::store::StoredRevision {
                    number: record.number,
                    created_at: record.created_at,
                },
            );
        }
        Self {
            inner: Mutex::new(file),
        }
    }

    pub fn len(&self) -> usize {
        self.guard().revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn guard(&self) -> MutexGuard<'_, RevisionFile> {
        // A panicking writer never leaves a half-applied insert behind.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RevisionStore for MemoryRevisionStore {
    fn latest(&self) -> Result<Option<RevisionRecord>, StoreError> {
        Ok(self.guard().latest())
    }

    fn get(&self, sha: &CommitSha) -> Result<Option<RevisionRecord>, StoreError> {
        Ok(self.guard().get(sha))
    }

    fn list(&self) -> Result<Vec<RevisionRecord>, StoreError> {
        Ok(self.guard().list())
    }

    fn insert(
        &self,
        record: &RevisionRecord,
        expected_latest: Option<u64>,
    ) -> Result<InsertOutcome, StoreError> {
        self.guard().insert_checked(record, expected_latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn record(c: char, number: u64) -> RevisionRecord {
        RevisionRecord {
            sha: CommitSha::parse(c.to_string().repeat(40)).unwrap(),
            number,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn seeded_store_reports_highest_number() {
        let store = MemoryRevisionStore::with_records([record('a', 4), record('b', 5)]);
        assert_eq!(store.latest().unwrap().map(|r| r.number), Some(5));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn racing_writers_assign_each_number_once() {
        let store = Arc::new(MemoryRevisionStore::with_records([record('0', 0)]));
        let handles: Vec<_> = ['a', 'b', 'c', 'd']
            .into_iter()
            .map(|c| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.insert(&record(c, 1), Some(0)))
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| matches!(r, Ok(InsertOutcome::Inserted)))
            .count();
        assert_eq!(inserted, 1, "exactly one writer may claim number 1");
        assert_eq!(store.len(), 2);
    }
}
