//! File-backed revision store.
//!
//! Persists a [`RevisionFile`] JSON document at
//! `<home>/.revwatch/revisions/<owner>__<repo>__<branch>.json`.
//!
//! Reads never lock: writes go to `<path>.tmp` and are renamed into place, so
//! a reader always sees a complete document. Writers serialise on
//! `<path>.lock`, created with `create_new` and holding the owner's pid. A
//! lock is never taken over: a writer that finds one gets
//! [`StoreError::Locked`], and a lock left by a crashed process has to be
//! removed by hand.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use revwatch_core::{paths, CommitSha, RevisionRecord, Upstream};

use crate::error::{io_err, StoreError};
use crate::store::{InsertOutcome, RevisionFile, RevisionStore};

#[derive(Debug, Clone)]
pub struct JsonRevisionStore {
    path: PathBuf,
}

impl JsonRevisionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `upstream` under `home`.
    pub fn open_at(home: &Path, upstream: &Upstream) -> Self {
        Self::new(paths::store_path(home, upstream))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Load the document. Returns an empty one if the file does not yet exist.
    pub fn load(&self) -> Result<RevisionFile, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RevisionFile::default()),
            Err(err) => return Err(io_err(&self.path, err)),
        };
        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, file: &RevisionFile) -> Result<(), StoreError> {
        let Some(dir) = self.path.parent() else {
            return Err(io_err(
                &self.path,
                std::io::Error::other("invalid revision store path"),
            ));
        };
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        let json = serde_json::to_string_pretty(file)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

impl RevisionStore for JsonRevisionStore {
    fn latest(&self) -> Result<Option<RevisionRecord>, StoreError> {
        Ok(self.load()?.latest())
    }

    fn get(&self, sha: &CommitSha) -> Result<Option<RevisionRecord>, StoreError> {
        Ok(self.load()?.get(sha))
    }

    fn list(&self) -> Result<Vec<RevisionRecord>, StoreError> {
        Ok(self.load()?.list())
    }

    fn insert(
        &self,
        record: &RevisionRecord,
        expected_latest: Option<u64>,
    ) -> Result<InsertOutcome, StoreError> {
        let _lock = StoreLock::acquire(self.lock_path())?;

        let mut file = self.load()?;
        let outcome = file.insert_checked(record, expected_latest)?;
        match &outcome {
            InsertOutcome::Inserted => {
                self.save(&file)?;
                tracing::info!(
                    "stored revision {} as #{} in {}",
                    record.sha,
                    record.number,
                    self.path.display()
                );
            }
            InsertOutcome::AlreadyPresent(existing) => {
                tracing::debug!("revision {} already stored as #{}", existing.sha, existing.number);
            }
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Lock file
// ---------------------------------------------------------------------------

/// Exclusive writer lock; the file is removed on drop.
#[derive(Debug)]
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let owner_pid = read_owner_pid(&path);
                tracing::warn!(
                    "revision store lock {} is held (owner pid {:?})",
                    path.display(),
                    owner_pid
                );
                return Err(StoreError::Locked { path, owner_pid });
            }
            Err(err) => return Err(io_err(&path, err)),
        };
        // From here on a failure drops `lock`, which removes the file again.
        let lock = Self { path };
        writeln!(file, "{}", std::process::id())
            .and_then(|()| file.sync_all())
            .map_err(|e| io_err(&lock.path, e))?;
        Ok(lock)
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Pid written by the lock's owner, if the file is readable and well-formed.
fn read_owner_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
