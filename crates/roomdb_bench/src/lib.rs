//! Benchmark utilities.

use roomdb_core::InitOptions;
use roomdb_testkit::fixtures::users::v1::User;
use roomdb_testkit::{users_room, TestStore};

/// Generate `count` unsaved users.
pub fn generate_users(count: usize) -> Vec<User> {
    (0..count).map(|i| User::new(format!("user-{i}"))).collect()
}

/// Opens an in-memory store initialized at version 1 holding `count` users.
pub fn seeded_store(count: usize) -> TestStore {
    let store = TestStore::memory();
    users_room(&store, 1)
        .initialize(InitOptions::default())
        .expect("initialize bench store");
    store
        .do_in_transaction(|tx| {
            for mut user in generate_users(count) {
                tx.create(&mut user)?;
            }
            Ok(())
        })
        .expect("seed bench store");
    store
}
