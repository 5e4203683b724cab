//! Embedded bucket store.
//!
//! A small ordered key-value store organized as named buckets:
//!
//! - every bucket maps byte keys to byte values, iterated in key order
//! - every bucket carries a monotonic sequence counter
//! - one write transaction at a time, any number of readers
//! - changes are made durable by an append-only commit log and replayed on
//!   open
//!
//! The whole bucket map lives in memory; the log on the
//! [`StorageBackend`] is the only persisted form.

mod log;
mod record;
mod snapshot;
mod txn;

pub use log::{CommitLog, ReplayStats};
pub use record::{compute_crc32, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
pub use snapshot::Snapshot;
pub use txn::{ReadTxn, WriteTxn};

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use parking_lot::{Mutex, RwLock};
use roomdb_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// An embedded bucket store.
///
/// Share it between threads with `Arc<BucketDb>`.
///
/// # Example
///
/// ```rust
/// use roomdb_core::BucketDb;
///
/// let db = BucketDb::open_in_memory().unwrap();
/// db.update(|txn| {
///     txn.create_bucket("User")?;
///     let id = txn.next_sequence("User")?;
///     txn.put("User", &id.to_be_bytes(), b"{}")
/// })
/// .unwrap();
///
/// let len = db.view(|txn| txn.bucket_len("User")).unwrap();
/// assert_eq!(len, 1);
/// ```
pub struct BucketDb {
    state: RwLock<Snapshot>,
    pub(crate) log: Mutex<CommitLog>,
    writer: Mutex<Option<ThreadId>>,
    /// Open read transactions per thread.
    readers: Mutex<HashMap<ThreadId, usize>>,
    next_txid: AtomicU64,
    path: Option<PathBuf>,
}

impl BucketDb {
    /// Opens (or creates) a file-backed store.
    ///
    /// An exclusive lock is taken on `<path>.lock` for the lifetime of the
    /// store.
    ///
    /// # Errors
    ///
    /// - `DatabaseLocked` if another handle has the store open
    /// - `InvalidConfig` if the file is missing and `create_if_missing` is off
    /// - `LogCorruption` / `ChecksumMismatch` if the log is damaged
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> CoreResult<Self> {
        let path = path.as_ref();
        if !config.create_if_missing && !path.exists() {
            return Err(CoreError::invalid_config(format!(
                "store {} does not exist",
                path.display()
            )));
        }

        let backend = FileBackend::open_locked(path).map_err(|err| match err {
            StorageError::Locked { .. } => CoreError::DatabaseLocked,
            other => CoreError::Storage(other),
        })?;
        let mut db = Self::open_with_backend(Box::new(backend), config)?;
        db.path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "opened bucket store");
        Ok(db)
    }

    /// Opens an empty store that lives only in memory.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), StoreConfig::default())
    }

    /// Opens a store over an arbitrary backend, replaying its log.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        let mut log = CommitLog::new(backend, config.sync_on_commit);
        let mut state = Snapshot::default();
        let stats = log.replay(|offset, batch| {
            for record in batch {
                state.apply(record, offset)?;
            }
            Ok(())
        })?;

        let next_txid = stats.last_txid.map_or(1, |txid| txid.as_u64() + 1);
        tracing::debug!(
            committed = stats.committed,
            buckets = state.bucket_names().count(),
            "replayed commit log"
        );

        Ok(Self {
            state: RwLock::new(state),
            log: Mutex::new(log),
            writer: Mutex::new(None),
            readers: Mutex::new(HashMap::new()),
            next_txid: AtomicU64::new(next_txid),
            path: None,
        })
    }

    /// Returns the file path for file-backed stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Begins a read transaction.
    ///
    /// A thread may hold several read transactions at once; later ones do
    /// not queue behind a waiting writer.
    ///
    /// # Errors
    ///
    /// `NestedTransaction` if the calling thread holds the write transaction.
    pub fn begin_read(&self) -> CoreResult<ReadTxn<'_>> {
        self.ensure_not_writer()?;
        let id = thread::current().id();
        let already_reading = {
            let mut readers = self.readers.lock();
            let count = readers.entry(id).or_insert(0);
            *count += 1;
            *count > 1
        };
        let guard = if already_reading {
            self.state.read_recursive()
        } else {
            self.state.read()
        };
        Ok(ReadTxn { db: self, guard })
    }

    /// Begins the write transaction, waiting for any other writer to finish.
    ///
    /// # Errors
    ///
    /// `NestedTransaction` if the calling thread already holds it or holds a
    /// read transaction.
    pub fn begin_write(&self) -> CoreResult<WriteTxn<'_>> {
        self.ensure_not_writer()?;
        if self.readers.lock().contains_key(&thread::current().id()) {
            return Err(CoreError::NestedTransaction);
        }
        let guard = self.state.write();
        *self.writer.lock() = Some(thread::current().id());
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        Ok(WriteTxn::new(self, txid, guard))
    }

    /// Runs `f` in a read transaction.
    pub fn view<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&ReadTxn<'_>) -> CoreResult<T>,
    {
        let txn = self.begin_read()?;
        f(&txn)
    }

    /// Runs `f` in the write transaction, committing on `Ok` and rolling
    /// back on `Err`.
    pub fn update<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> CoreResult<T>,
    {
        let mut txn = self.begin_write()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = txn.rollback() {
                    tracing::warn!(error = %rollback, "rollback after failed update");
                }
                Err(err)
            }
        }
    }

    /// Returns the current commit-log size in bytes.
    pub fn log_size(&self) -> CoreResult<u64> {
        self.log.lock().size()
    }

    fn ensure_not_writer(&self) -> CoreResult<()> {
        if *self.writer.lock() == Some(thread::current().id()) {
            return Err(CoreError::NestedTransaction);
        }
        Ok(())
    }

    pub(crate) fn release_writer(&self) {
        *self.writer.lock() = None;
    }

    pub(crate) fn release_reader(&self) {
        let id = thread::current().id();
        let mut readers = self.readers.lock();
        if let Some(count) = readers.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                readers.remove(&id);
            }
        }
    }
}

impl std::fmt::Debug for BucketDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketDb")
            .field("path", &self.path)
            .field("next_txid", &self.next_txid.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
