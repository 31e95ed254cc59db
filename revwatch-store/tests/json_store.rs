use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use filetime::{set_file_mtime, FileTime};
use revwatch_core::{paths, CommitSha, RevisionRecord, Upstream};
use revwatch_store::{InsertOutcome, JsonRevisionStore, RevisionStore, StoreError};
use tempfile::TempDir;

fn record(c: char, number: u64) -> RevisionRecord {
    RevisionRecord {
        sha: CommitSha::parse(c.to_string().repeat(40)).expect("sha"),
        number,
        created_at: Utc::now(),
    }
}

#[test]
fn two_handles_cannot_both_claim_the_next_number() {
    let home = TempDir::new().expect("home");
    let upstream = Upstream::default();
    let a = JsonRevisionStore::open_at(home.path(), &upstream);
    let b = JsonRevisionStore::open_at(home.path(), &upstream);

    a.insert(&record('0', 0), None).expect("seed");

    // Both read latest = 0, both try to write number 1.
    let seen_a = a.latest().expect("latest").map(|r| r.number);
    let seen_b = b.latest().expect("latest").map(|r| r.number);
    assert_eq!(a.insert(&record('a', 1), seen_a).expect("a"), InsertOutcome::Inserted);

    let err = b.insert(&record('b', 1), seen_b).expect_err("b must lose");
    assert!(
        matches!(err, StoreError::Conflict { expected: Some(0), found: Some(1) }),
        "got {err:?}"
    );

    let numbers: Vec<u64> = a.list().expect("list").iter().map(|r| r.number).collect();
    assert_eq!(numbers, vec![1, 0]);
}

#[test]
fn same_sha_from_second_writer_is_idempotent() {
    let home = TempDir::new().expect("home");
    let upstream = Upstream::default();
    let a = JsonRevisionStore::open_at(home.path(), &upstream);
    let b = JsonRevisionStore::open_at(home.path(), &upstream);

    let first = record('a', 0);
    a.insert(&first, None).expect("a");
    let outcome = b.insert(&record('a', 0), None).expect("b");
    assert_eq!(outcome, InsertOutcome::AlreadyPresent(first));
    assert_eq!(b.list().expect("list").len(), 1);
}

#[test]
fn aged_lock_is_never_taken_over() {
    let _ = env_logger::builder().is_test(true).try_init();
    let home = TempDir::new().expect("home");
    let upstream = Upstream::default();

    let lock = paths::store_path(home.path(), &upstream).with_extension("json.lock");
    fs::create_dir_all(lock.parent().expect("parent")).expect("mkdir");
    fs::write(&lock, "4242\n").expect("write lock");
    let old = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(10 * 60));
    set_file_mtime(&lock, old).expect("age lock");

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let barrier = barrier.clone();
            let store = JsonRevisionStore::open_at(home.path(), &upstream);
            thread::spawn(move || {
                barrier.wait();
                store.insert(&record(char::from(b'0' + i), 0), None)
            })
        })
        .collect();

    for handle in handles {
        match handle.join().expect("join") {
            Err(StoreError::Locked { owner_pid, .. }) => assert_eq!(owner_pid, Some(4242)),
            other => panic!("writer got past a held lock: {other:?}"),
        }
    }
    assert_eq!(fs::read_to_string(&lock).expect("lock"), "4242\n");

    let store = JsonRevisionStore::open_at(home.path(), &upstream);
    assert!(store.latest().expect("latest").is_none());

    // Once the leftover lock is removed, writes go through again.
    fs::remove_file(&lock).expect("remove lock");
    assert_eq!(
        store.insert(&record('a', 0), None).expect("insert"),
        InsertOutcome::Inserted
    );
}

#[test]
fn racing_writers_store_exactly_one_first_revision() {
    let home = TempDir::new().expect("home");
    let upstream = Upstream::default();

    for _ in 0..20 {
        let store = JsonRevisionStore::open_at(home.path(), &upstream);
        if store.path().exists() {
            fs::remove_file(store.path()).expect("reset");
        }

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let barrier = barrier.clone();
                let store = store.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.insert(&record(char::from(b'0' + i), 0), None)
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|r| matches!(r, Ok(InsertOutcome::Inserted)))
            .count();
        assert!(inserted <= 1, "{inserted} writers claimed number 0");
        assert_eq!(store.list().expect("list").len(), inserted);
    }
}

#[test]
fn document_layout_is_keyed_by_sha() {
    let home = TempDir::new().expect("home");
    let store = JsonRevisionStore::open_at(home.path(), &Upstream::default());
    store.insert(&record('c', 0), None).expect("insert");

    let raw = fs::read_to_string(store.path()).expect("read");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    let entry = &value["revisions"]["c".repeat(40)];
    assert_eq!(entry["number"], serde_json::json!(0));
    assert!(entry["created_at"].is_string());
}
