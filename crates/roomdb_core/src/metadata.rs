//! Schema metadata bucket.
//!
//! Every successful initialization or migration step appends one
//! [`SchemaRecord`] to a reserved bucket. Records are keyed by the bucket's
//! sequence counter and never rewritten, so the newest record is always the
//! one with the highest key.

use crate::error::{CoreError, CoreResult};
use crate::kv::{Snapshot, WriteTxn};
use crate::types::{decode_key, encode_key, VersionNumber};
use serde::{Deserialize, Serialize};

/// Name of the reserved metadata bucket.
pub const SCHEMA_MASTER_BUCKET: &str = "__room_schema_master";

/// One entry of the schema history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Sequence number the record is stored under.
    pub id: u64,
    /// Identity hash of the registered entities; empty for intermediate
    /// migration steps.
    pub identity_hash: String,
    /// Schema version the store was brought to.
    pub version: VersionNumber,
}

pub(crate) fn latest(snapshot: &Snapshot) -> CoreResult<(String, VersionNumber)> {
    if !snapshot.bucket_exists(SCHEMA_MASTER_BUCKET) {
        return Err(CoreError::no_such_table(SCHEMA_MASTER_BUCKET));
    }

    match snapshot.last_entry(SCHEMA_MASTER_BUCKET)? {
        None => Ok((String::new(), VersionNumber::UNINITIALIZED)),
        Some((key, value)) => {
            let record = decode_record(key, value)?;
            Ok((record.identity_hash, record.version))
        }
    }
}

pub(crate) fn history(snapshot: &Snapshot) -> CoreResult<Vec<SchemaRecord>> {
    if !snapshot.bucket_exists(SCHEMA_MASTER_BUCKET) {
        return Err(CoreError::no_such_table(SCHEMA_MASTER_BUCKET));
    }

    snapshot
        .entries(SCHEMA_MASTER_BUCKET)?
        .map(|(key, value)| decode_record(key, value))
        .collect()
}

pub(crate) fn ensure_bucket(txn: &mut WriteTxn<'_>) -> CoreResult<bool> {
    if txn.bucket_exists(SCHEMA_MASTER_BUCKET) {
        return Ok(false);
    }
    txn.create_bucket(SCHEMA_MASTER_BUCKET)?;
    tracing::debug!(bucket = SCHEMA_MASTER_BUCKET, "created metadata bucket");
    Ok(true)
}

pub(crate) fn append(
    txn: &mut WriteTxn<'_>,
    identity_hash: &str,
    version: VersionNumber,
) -> CoreResult<SchemaRecord> {
    if !txn.bucket_exists(SCHEMA_MASTER_BUCKET) {
        return Err(CoreError::no_such_table(SCHEMA_MASTER_BUCKET));
    }

    let id = txn.next_sequence(SCHEMA_MASTER_BUCKET)?;
    let record = SchemaRecord {
        id,
        identity_hash: identity_hash.to_string(),
        version,
    };
    let bytes = serde_json::to_vec(&record)?;
    txn.put(SCHEMA_MASTER_BUCKET, &encode_key(id), &bytes)?;
    Ok(record)
}

fn decode_record(key: &[u8], value: &[u8]) -> CoreResult<SchemaRecord> {
    let id = decode_key(key).unwrap_or_default();
    serde_json::from_slice(value).map_err(|err| CoreError::CorruptMetadata {
        key: id,
        message: err.to_string(),
    })
}
