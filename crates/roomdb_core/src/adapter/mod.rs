//! Entity persistence over the bucket store.
//!
//! [`ObjectStoreAdapter`] maps each entity type to a bucket named after the
//! type, assigns identifiers from the bucket's sequence counter and stores
//! records as JSON under 8-byte big-endian keys. Each call runs in its own
//! transaction; use [`ObjectStoreAdapter::do_in_transaction`] to group calls.

mod scope;

pub use crate::types::{decode_key, encode_key};
pub use scope::TxStore;

use crate::error::CoreResult;
use crate::kv::BucketDb;
use crate::metadata::{self, SchemaRecord};
use crate::model::{model_of, Entity, ModelDefinition};
use crate::types::VersionNumber;
use std::sync::Arc;

/// Entity-level access to a [`BucketDb`].
///
/// Cheap to clone; clones share the store.
#[derive(Debug, Clone)]
pub struct ObjectStoreAdapter {
    db: Arc<BucketDb>,
}

impl ObjectStoreAdapter {
    /// Wraps an open store.
    #[must_use]
    pub fn new(db: Arc<BucketDb>) -> Self {
        Self { db }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn underlying_store(&self) -> &Arc<BucketDb> {
        &self.db
    }

    /// Runs `f` in one write transaction: everything commits if it returns
    /// `Ok`, nothing does if it returns `Err`.
    ///
    /// Calling back into this adapter (rather than the `TxStore` handed to
    /// `f`) from inside `f` fails with `NestedTransaction`.
    pub fn do_in_transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut TxStore<'_>) -> CoreResult<T>,
    {
        let mut tx = TxStore::new(self.db.begin_write()?);
        match f(&mut tx) {
            Ok(value) => {
                tx.into_inner().commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.into_inner().rollback() {
                    tracing::warn!(error = %rollback, "rollback after failed unit of work");
                }
                Err(err)
            }
        }
    }

    /// Returns true if the bucket for `E` exists.
    pub fn has_table<E: Entity>(&self) -> CoreResult<bool> {
        self.has_bucket(&model_of::<E>()?)
    }

    /// Returns true if the bucket for `model` exists.
    pub fn has_bucket(&self, model: &ModelDefinition) -> CoreResult<bool> {
        self.db.view(|txn| read::has_bucket(txn, model))
    }

    /// Creates one bucket per model, all or nothing.
    pub fn create_table(&self, models: &[ModelDefinition]) -> CoreResult<()> {
        self.do_in_transaction(|tx| tx.create_table(models))
    }

    /// Deletes every record of `E` but keeps the bucket.
    pub fn truncate_table<E: Entity>(&self) -> CoreResult<usize> {
        self.do_in_transaction(|tx| tx.truncate_table::<E>())
    }

    /// Deletes every record in the model's bucket but keeps the bucket.
    pub fn truncate_bucket(&self, model: &ModelDefinition) -> CoreResult<usize> {
        self.do_in_transaction(|tx| tx.truncate_bucket(model))
    }

    /// Stores `entity` under a fresh identifier and returns it.
    ///
    /// See [`TxStore::create`].
    pub fn create<E: Entity>(&self, entity: &mut E) -> CoreResult<u64> {
        self.do_in_transaction(|tx| tx.create(entity))
    }

    /// Deletes one bucket per model, all or nothing.
    pub fn drop_table(&self, models: &[ModelDefinition]) -> CoreResult<()> {
        self.do_in_transaction(|tx| tx.drop_table(models))
    }

    /// Returns the model definition of `E`.
    pub fn get_model_definition<E: Entity>(&self) -> CoreResult<ModelDefinition> {
        model_for::<E>()
    }

    /// Loads the record stored under `id`.
    pub fn get<E: Entity>(&self, id: u64) -> CoreResult<Option<E>> {
        let model = model_for::<E>()?;
        self.db.view(|txn| read::get(txn, &model, id))
    }

    /// Loads every record of `E` in key order.
    pub fn scan<E: Entity>(&self) -> CoreResult<Vec<E>> {
        let model = model_for::<E>()?;
        self.db.view(|txn| read::scan(txn, &model))
    }

    /// Counts the records of `E`.
    pub fn count<E: Entity>(&self) -> CoreResult<usize> {
        let model = model_for::<E>()?;
        self.db.view(|txn| read::count(txn, &model))
    }

    /// Latest recorded identity hash and schema version; `("", 0)` if the
    /// metadata bucket is empty.
    ///
    /// # Errors
    ///
    /// `NoSuchTable` if the metadata bucket does not exist, `CorruptMetadata`
    /// if the newest record cannot be decoded.
    pub fn latest_identity_and_version(&self) -> CoreResult<(String, VersionNumber)> {
        self.db.view(|txn| metadata::latest(txn))
    }

    /// Every schema record in write order.
    pub fn history(&self) -> CoreResult<Vec<SchemaRecord>> {
        self.db.view(|txn| metadata::history(txn))
    }

    /// Appends a schema record in its own transaction.
    pub fn record_schema_version(
        &self,
        identity_hash: &str,
        version: VersionNumber,
    ) -> CoreResult<SchemaRecord> {
        self.do_in_transaction(|tx| tx.record_schema_version(identity_hash, version))
    }

    /// Creates the metadata bucket if it is missing.
    pub fn ensure_metadata_bucket(&self) -> CoreResult<bool> {
        self.do_in_transaction(|tx| tx.ensure_metadata_bucket())
    }
}

pub(crate) fn model_for<E: Entity>() -> CoreResult<ModelDefinition> {
    let model = model_of::<E>()?;
    model.ensure_valid()?;
    Ok(model)
}

/// Read paths shared by the adapter and the transaction-bound store.
pub(crate) mod read {
    use crate::error::{CoreError, CoreResult};
    use crate::kv::Snapshot;
    use crate::model::ModelDefinition;
    use crate::types::encode_key;
    use serde::de::DeserializeOwned;

    pub(crate) fn has_bucket(snapshot: &Snapshot, model: &ModelDefinition) -> CoreResult<bool> {
        model.ensure_valid()?;
        Ok(snapshot.bucket_exists(&model.table_name))
    }

    pub(crate) fn get<E: DeserializeOwned>(
        snapshot: &Snapshot,
        model: &ModelDefinition,
        id: u64,
    ) -> CoreResult<Option<E>> {
        let table = existing(snapshot, model)?;
        snapshot
            .get(table, &encode_key(id))?
            .map(|bytes| serde_json::from_slice(bytes).map_err(CoreError::from))
            .transpose()
    }

    pub(crate) fn scan<E: DeserializeOwned>(
        snapshot: &Snapshot,
        model: &ModelDefinition,
    ) -> CoreResult<Vec<E>> {
        let table = existing(snapshot, model)?;
        snapshot
            .entries(table)?
            .map(|(_, bytes)| serde_json::from_slice(bytes).map_err(CoreError::from))
            .collect()
    }

    pub(crate) fn count(snapshot: &Snapshot, model: &ModelDefinition) -> CoreResult<usize> {
        let table = existing(snapshot, model)?;
        snapshot.bucket_len(table)
    }

    fn existing<'m>(snapshot: &Snapshot, model: &'m ModelDefinition) -> CoreResult<&'m str> {
        model.ensure_valid()?;
        if !snapshot.bucket_exists(&model.table_name) {
            return Err(CoreError::no_such_table(&model.table_name));
        }
        Ok(&model.table_name)
    }
}
