//! Read and write transactions.

use crate::error::{CoreError, CoreResult};
use crate::kv::record::LogRecord;
use crate::kv::snapshot::Snapshot;
use crate::kv::BucketDb;
use crate::types::TransactionId;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;

/// A read-only transaction.
///
/// Holds the shared lock for its lifetime; any number may be open at once,
/// but they wait behind an in-flight [`WriteTxn`].
pub struct ReadTxn<'db> {
    pub(crate) db: &'db BucketDb,
    pub(crate) guard: RwLockReadGuard<'db, Snapshot>,
}

impl Drop for ReadTxn<'_> {
    fn drop(&mut self) {
        self.db.release_reader();
    }
}

impl Deref for ReadTxn<'_> {
    type Target = Snapshot;

    fn deref(&self) -> &Snapshot {
        &self.guard
    }
}

impl std::fmt::Debug for ReadTxn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadTxn").finish_non_exhaustive()
    }
}

/// The single read-write transaction.
///
/// Mutations go to a private working copy and are logged; [`WriteTxn::commit`]
/// writes the log batch and publishes the working copy. Dropping the
/// transaction without committing rolls it back.
///
/// Reads through `Deref` see this transaction's own uncommitted writes.
pub struct WriteTxn<'db> {
    db: &'db BucketDb,
    txid: TransactionId,
    guard: Option<RwLockWriteGuard<'db, Snapshot>>,
    working: Snapshot,
    ops: Vec<LogRecord>,
    /// Highest sequence allocated per bucket that predates this transaction.
    allocated: BTreeMap<String, u64>,
    created: BTreeSet<String>,
}

impl<'db> WriteTxn<'db> {
    pub(crate) fn new(
        db: &'db BucketDb,
        txid: TransactionId,
        guard: RwLockWriteGuard<'db, Snapshot>,
    ) -> Self {
        let working = guard.clone();
        Self {
            db,
            txid,
            guard: Some(guard),
            working,
            ops: Vec::new(),
            allocated: BTreeMap::new(),
            created: BTreeSet::new(),
        }
    }

    /// Returns this transaction's id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.txid
    }

    /// Creates an empty bucket.
    ///
    /// # Errors
    ///
    /// `BucketExists` if the name is taken; `InvalidOperation` for an empty
    /// name.
    pub fn create_bucket(&mut self, name: &str) -> CoreResult<()> {
        if name.is_empty() {
            return Err(CoreError::invalid_operation("bucket name must not be empty"));
        }
        if self.working.bucket_exists(name) {
            return Err(CoreError::BucketExists { name: name.into() });
        }
        self.working.insert_bucket(name.to_string());
        self.created.insert(name.to_string());
        self.ops.push(LogRecord::CreateBucket {
            bucket: name.to_string(),
        });
        Ok(())
    }

    /// Deletes a bucket and every entry in it.
    ///
    /// # Errors
    ///
    /// `BucketNotFound` if it does not exist.
    pub fn delete_bucket(&mut self, name: &str) -> CoreResult<()> {
        if !self.working.remove_bucket(name) {
            return Err(CoreError::BucketNotFound { name: name.into() });
        }
        self.ops.push(LogRecord::DeleteBucket {
            bucket: name.to_string(),
        });
        Ok(())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.working
            .bucket_mut(bucket)?
            .entries
            .insert(key.to_vec(), value.to_vec());
        self.ops.push(LogRecord::Put {
            bucket: bucket.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }

    /// Removes `key`. Returns whether it was present.
    pub fn delete(&mut self, bucket: &str, key: &[u8]) -> CoreResult<bool> {
        let existed = self.working.bucket_mut(bucket)?.entries.remove(key).is_some();
        if existed {
            self.ops.push(LogRecord::Delete {
                bucket: bucket.to_string(),
                key: key.to_vec(),
            });
        }
        Ok(existed)
    }

    /// Advances the bucket's sequence counter and returns the new value.
    /// The first value handed out by a fresh bucket is 1.
    ///
    /// Values are never reissued, even if this transaction rolls back.
    pub fn next_sequence(&mut self, bucket: &str) -> CoreResult<u64> {
        let data = self.working.bucket_mut(bucket)?;
        let sequence = data
            .sequence
            .checked_add(1)
            .ok_or_else(|| CoreError::invalid_operation("bucket sequence exhausted"))?;
        data.sequence = sequence;

        if !self.created.contains(bucket) {
            self.allocated.insert(bucket.to_string(), sequence);
        }
        self.ops.push(LogRecord::SetSequence {
            bucket: bucket.to_string(),
            sequence,
        });
        Ok(sequence)
    }

    /// Makes every change durable and visible.
    ///
    /// # Errors
    ///
    /// If the log write fails nothing is published.
    pub fn commit(mut self) -> CoreResult<()> {
        let Some(mut guard) = self.guard.take() else {
            return Err(CoreError::invalid_operation("transaction already finished"));
        };

        let ops = std::mem::take(&mut self.ops);
        let result = if ops.is_empty() {
            Ok(())
        } else {
            self.db.log.lock().append_batch(&ops, self.txid)
        };

        if result.is_ok() {
            *guard = std::mem::take(&mut self.working);
            tracing::debug!(txid = %self.txid, records = ops.len(), "committed");
        }
        self.db.release_writer();
        drop(guard);
        result
    }

    /// Discards every change except sequence allocations on buckets that
    /// existed before the transaction.
    pub fn rollback(mut self) -> CoreResult<()> {
        self.finish_rollback()
    }

    fn finish_rollback(&mut self) -> CoreResult<()> {
        let Some(mut guard) = self.guard.take() else {
            return Ok(());
        };
        let result = self.persist_allocated_sequences(&mut guard);
        self.db.release_writer();
        drop(guard);
        result
    }

    fn persist_allocated_sequences(
        &mut self,
        committed: &mut RwLockWriteGuard<'db, Snapshot>,
    ) -> CoreResult<()> {
        let advanced: Vec<(String, u64)> = std::mem::take(&mut self.allocated)
            .into_iter()
            .filter(|(name, sequence)| {
                committed
                    .sequence(name)
                    .map_or(false, |current| current < *sequence)
            })
            .collect();
        if advanced.is_empty() {
            return Ok(());
        }

        let ops: Vec<LogRecord> = advanced
            .iter()
            .map(|(bucket, sequence)| LogRecord::SetSequence {
                bucket: bucket.clone(),
                sequence: *sequence,
            })
            .collect();
        self.db.log.lock().append_batch(&ops, self.txid)?;

        for (bucket, sequence) in advanced {
            committed.bucket_mut(&bucket)?.sequence = sequence;
        }
        tracing::debug!(txid = %self.txid, buckets = ops.len(), "rolled back, sequences kept");
        Ok(())
    }
}

impl Deref for WriteTxn<'_> {
    type Target = Snapshot;

    fn deref(&self) -> &Snapshot {
        &self.working
    }
}

impl Drop for WriteTxn<'_> {
    fn drop(&mut self) {
        if self.guard.is_some() {
            if let Err(err) = self.finish_rollback() {
                tracing::warn!(txid = %self.txid, error = %err, "rollback on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for WriteTxn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTxn")
            .field("txid", &self.txid)
            .field("pending_records", &self.ops.len())
            .finish_non_exhaustive()
    }
}
