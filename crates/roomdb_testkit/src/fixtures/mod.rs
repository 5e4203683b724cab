//! Test fixtures and store helpers.
//!
//! Provides temporary stores that clean up after themselves and the sample
//! `User` schema used across the integration tests.

pub mod users;

use roomdb_core::{BucketDb, ObjectStoreAdapter, StoreConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub use users::users_room;

/// File name of the store inside a temporary directory.
pub const STORE_FILE: &str = "room.db";

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub db: Arc<BucketDb>,
    /// Adapter over `db`.
    pub adapter: ObjectStoreAdapter,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        let db = BucketDb::open_in_memory().expect("Failed to open in-memory store");
        Self::wrap(db, None)
    }

    /// Creates a new file-backed test store in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self::open_in(temp_dir)
    }

    /// Closes and reopens a file-backed store, replaying its log.
    ///
    /// Every other clone of the adapter must be dropped first, or the reopen
    /// fails on the store lock.
    pub fn reopen(self) -> Self {
        Self::open_in(self.close())
    }

    /// Closes a file-backed store and hands back its directory, so the store
    /// file can be inspected or damaged before [`TestStore::open_in`].
    pub fn close(self) -> TempDir {
        let Self {
            db,
            adapter,
            temp_dir,
        } = self;
        drop(adapter);
        drop(db);
        temp_dir.expect("Only file-backed stores can be closed")
    }

    /// Opens the store file inside `temp_dir`.
    pub fn open_in(temp_dir: TempDir) -> Self {
        let path = temp_dir.path().join(STORE_FILE);
        let db = BucketDb::open(&path, StoreConfig::default()).expect("Failed to open file store");
        Self::wrap(db, Some(temp_dir))
    }

    /// Returns the store file path if file-backed, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join(STORE_FILE))
    }

    fn wrap(db: BucketDb, temp_dir: Option<TempDir>) -> Self {
        let db = Arc::new(db);
        Self {
            adapter: ObjectStoreAdapter::new(Arc::clone(&db)),
            db,
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = ObjectStoreAdapter;

    fn deref(&self) -> &Self::Target {
        &self.adapter
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&ObjectStoreAdapter) -> R,
{
    let store = TestStore::memory();
    f(&store.adapter)
}

/// Runs a test with a temporary file-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&ObjectStoreAdapter, &Path) -> R,
{
    let store = TestStore::file();
    let path = store.path().expect("File store should have a path");
    f(&store.adapter, &path)
}
