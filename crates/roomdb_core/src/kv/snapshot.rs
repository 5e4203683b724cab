//! Point-in-time view of the bucket map.

use crate::error::{CoreError, CoreResult};
use crate::kv::record::LogRecord;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One bucket: its sequence counter and ordered entries.
#[derive(Debug, Clone, Default)]
pub(crate) struct BucketData {
    pub(crate) sequence: u64,
    pub(crate) entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Every bucket in the store as of one moment.
///
/// Buckets are reference counted; cloning a snapshot is cheap, and a write
/// transaction copies a bucket only the first time it mutates it.
///
/// Read transactions and write transactions both dereference to a
/// `Snapshot`, so all read operations live here.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    buckets: BTreeMap<String, Arc<BucketData>>,
}

impl Snapshot {
    /// Returns true if `bucket` exists.
    #[must_use]
    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.buckets.contains_key(bucket)
    }

    /// Returns the names of all buckets in byte order.
    pub fn bucket_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.buckets.keys().map(String::as_str)
    }

    /// Returns the number of entries in `bucket`.
    pub fn bucket_len(&self, bucket: &str) -> CoreResult<usize> {
        Ok(self.bucket(bucket)?.entries.len())
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, bucket: &str, key: &[u8]) -> CoreResult<Option<&[u8]>> {
        Ok(self.bucket(bucket)?.entries.get(key).map(Vec::as_slice))
    }

    /// Iterates over `bucket` in key order.
    pub fn entries(
        &self,
        bucket: &str,
    ) -> CoreResult<impl Iterator<Item = (&[u8], &[u8])> + '_> {
        Ok(self
            .bucket(bucket)?
            .entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice())))
    }

    /// Collects every key of `bucket` in key order.
    pub fn keys(&self, bucket: &str) -> CoreResult<Vec<Vec<u8>>> {
        Ok(self.bucket(bucket)?.entries.keys().cloned().collect())
    }

    /// Returns the entry with the highest key.
    pub fn last_entry(&self, bucket: &str) -> CoreResult<Option<(&[u8], &[u8])>> {
        Ok(self
            .bucket(bucket)?
            .entries
            .iter()
            .next_back()
            .map(|(k, v)| (k.as_slice(), v.as_slice())))
    }

    /// Returns the last value handed out by the bucket's sequence counter.
    pub fn sequence(&self, bucket: &str) -> CoreResult<u64> {
        Ok(self.bucket(bucket)?.sequence)
    }

    fn bucket(&self, name: &str) -> CoreResult<&BucketData> {
        self.buckets
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| CoreError::BucketNotFound { name: name.into() })
    }

    pub(crate) fn bucket_mut(&mut self, name: &str) -> CoreResult<&mut BucketData> {
        self.buckets
            .get_mut(name)
            .map(Arc::make_mut)
            .ok_or_else(|| CoreError::BucketNotFound { name: name.into() })
    }

    pub(crate) fn insert_bucket(&mut self, name: String) {
        self.buckets.insert(name, Arc::new(BucketData::default()));
    }

    pub(crate) fn remove_bucket(&mut self, name: &str) -> bool {
        self.buckets.remove(name).is_some()
    }

    /// Applies a replayed record. `offset` locates the batch for errors.
    pub(crate) fn apply(&mut self, record: LogRecord, offset: u64) -> CoreResult<()> {
        let missing = |bucket: &str| {
            CoreError::log_corruption(offset, format!("record for unknown bucket {bucket}"))
        };

        match record {
            LogRecord::CreateBucket { bucket } => self.insert_bucket(bucket),
            LogRecord::DeleteBucket { bucket } => {
                if !self.remove_bucket(&bucket) {
                    return Err(missing(&bucket));
                }
            }
            LogRecord::Put { bucket, key, value } => {
                let data = self.bucket_mut(&bucket).map_err(|_| missing(&bucket))?;
                data.entries.insert(key, value);
            }
            LogRecord::Delete { bucket, key } => {
                let data = self.bucket_mut(&bucket).map_err(|_| missing(&bucket))?;
                data.entries.remove(&key);
            }
            LogRecord::SetSequence { bucket, sequence } => {
                let data = self.bucket_mut(&bucket).map_err(|_| missing(&bucket))?;
                data.sequence = data.sequence.max(sequence);
            }
            LogRecord::Commit { .. } => {}
        }
        Ok(())
    }
}
