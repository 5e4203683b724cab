//! File-backed stores: reopen, torn tails, corruption and locking.

use roomdb_core::{BucketDb, CoreError, StoreConfig, VersionNumber};
use roomdb_testkit::fixtures::users::v1::User;
use roomdb_testkit::fixtures::STORE_FILE;
use roomdb_testkit::prelude::*;
use std::fs::{self, OpenOptions};

fn seeded_file_store(names: &[&str]) -> TestStore {
    let store = TestStore::file();
    users_room(&store, 1)
        .initialize(InitOptions::default())
        .unwrap();
    for name in names {
        store.create(&mut User::new(*name)).unwrap();
    }
    store
}

#[test]
fn committed_data_survives_reopen() {
    let store = seeded_file_store(&["ana", "bo"]).reopen();

    let names: Vec<String> = store.scan::<User>().unwrap().into_iter().map(|u| u.name).collect();
    assert_eq!(names, vec!["ana", "bo"]);
    assert_eq!(
        store.latest_identity_and_version().unwrap().1,
        VersionNumber::new(1)
    );

    let mut next = User::new("cy");
    store.create(&mut next).unwrap();
    assert_eq!(next.id, 3);
}

#[test]
fn torn_tail_is_discarded() {
    init_test_logging();
    let dir = seeded_file_store(&["ana", "bo"]).close();
    let path = dir.path().join(STORE_FILE);

    let len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    let store = TestStore::open_in(dir);
    let names: Vec<String> = store.scan::<User>().unwrap().into_iter().map(|u| u.name).collect();
    assert_eq!(names, vec!["ana"]);
    assert!(store.db.log_size().unwrap() < len);

    store.create(&mut User::new("cy")).unwrap();
    let store = store.reopen();
    assert_eq!(store.count::<User>().unwrap(), 2);
}

#[test]
fn garbage_tail_shorter_than_a_header_is_discarded() {
    let dir = seeded_file_store(&["ana"]).close();
    let path = dir.path().join(STORE_FILE);

    let mut bytes = fs::read(&path).unwrap();
    let committed = bytes.len() as u64;
    bytes.extend_from_slice(b"RMK");
    fs::write(&path, &bytes).unwrap();

    let store = TestStore::open_in(dir);
    assert_eq!(store.count::<User>().unwrap(), 1);
    assert_eq!(store.db.log_size().unwrap(), committed);
}

#[test]
fn flipped_byte_is_fatal() {
    let dir = seeded_file_store(&["ana"]).close();
    let path = dir.path().join(STORE_FILE);

    let mut bytes = fs::read(&path).unwrap();
    bytes[20] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let result = BucketDb::open(&path, StoreConfig::default());
    assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
}

#[test]
fn foreign_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(STORE_FILE);
    fs::write(&path, b"definitely not a commit log").unwrap();

    let result = BucketDb::open(&path, StoreConfig::default());
    assert!(matches!(result, Err(CoreError::LogCorruption { offset: 0, .. })));
}

#[test]
fn second_open_is_locked_out() {
    let store = seeded_file_store(&[]);
    let path = store.path().unwrap();

    assert!(matches!(
        BucketDb::open(&path, StoreConfig::default()),
        Err(CoreError::DatabaseLocked)
    ));

    let store = store.reopen();
    assert!(store.has_table::<User>().unwrap());
}

#[test]
fn missing_file_without_create_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new().create_if_missing(false);
    let result = BucketDb::open(dir.path().join(STORE_FILE), config);
    assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
}
