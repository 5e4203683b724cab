//! Bucket store bound to one write transaction.

use crate::adapter::{model_for, read};
use crate::error::{CoreError, CoreResult};
use crate::kv::WriteTxn;
use crate::metadata::{self, SchemaRecord};
use crate::model::{model_of, Entity, ModelDefinition};
use crate::types::{decode_key, encode_key, VersionNumber};

/// The bucket store inside a transaction.
///
/// Handed to the closure of
/// [`ObjectStoreAdapter::do_in_transaction`](crate::ObjectStoreAdapter::do_in_transaction)
/// and to [`Migration::apply`](crate::Migration::apply). Every operation
/// joins the surrounding transaction; nothing is visible to other handles
/// until it commits.
pub struct TxStore<'db> {
    txn: WriteTxn<'db>,
}

impl<'db> TxStore<'db> {
    pub(crate) fn new(txn: WriteTxn<'db>) -> Self {
        Self { txn }
    }

    pub(crate) fn into_inner(self) -> WriteTxn<'db> {
        self.txn
    }

    /// Runs `f` against this store. No new transaction is opened; `f`'s
    /// writes commit or roll back with the surrounding one.
    pub fn do_in_transaction<F, T>(&mut self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut TxStore<'db>) -> CoreResult<T>,
    {
        f(self)
    }

    /// Returns true if the bucket for `E` exists.
    pub fn has_table<E: Entity>(&self) -> CoreResult<bool> {
        self.has_bucket(&model_of::<E>()?)
    }

    /// Returns true if the bucket for `model` exists.
    pub fn has_bucket(&self, model: &ModelDefinition) -> CoreResult<bool> {
        read::has_bucket(&self.txn, model)
    }

    /// Creates one bucket per model.
    ///
    /// # Errors
    ///
    /// `BucketCreateFailed` if any bucket already exists; the surrounding
    /// transaction should then be rolled back.
    pub fn create_table(&mut self, models: &[ModelDefinition]) -> CoreResult<()> {
        for model in models {
            model.ensure_valid()?;
            self.txn
                .create_bucket(&model.table_name)
                .map_err(|err| CoreError::BucketCreateFailed {
                    name: model.table_name.clone(),
                    reason: err.to_string(),
                })?;
            tracing::debug!(bucket = %model.table_name, "created bucket");
        }
        Ok(())
    }

    /// Deletes every record of `E` but keeps the bucket.
    pub fn truncate_table<E: Entity>(&mut self) -> CoreResult<usize> {
        self.truncate_bucket(&model_of::<E>()?)
    }

    /// Deletes every record in the model's bucket but keeps the bucket.
    /// Returns the number of records removed.
    pub fn truncate_bucket(&mut self, model: &ModelDefinition) -> CoreResult<usize> {
        let table = self.existing_table(model)?;
        let keys = self.txn.keys(table)?;
        for key in &keys {
            self.txn.delete(table, key)?;
        }
        Ok(keys.len())
    }

    /// Stores `entity` under a fresh sequence number, writing the number
    /// into its identifier field first. Returns the number.
    ///
    /// # Errors
    ///
    /// - `NoSuchTable` if the bucket does not exist
    /// - `SerializationFailed` if the entity cannot be encoded; the sequence
    ///   number stays consumed
    pub fn create<E: Entity>(&mut self, entity: &mut E) -> CoreResult<u64> {
        let model = model_for::<E>()?;
        let table = self.existing_table(&model)?;

        let id = self.txn.next_sequence(table)?;
        if let Some(slot) = entity.id_mut() {
            *slot = id;
        }
        let bytes = serde_json::to_vec(entity)?;
        self.txn.put(table, &encode_key(id), &bytes)?;
        Ok(id)
    }

    /// Deletes one bucket per model.
    ///
    /// # Errors
    ///
    /// `BucketDeleteFailed` on the first bucket that cannot be deleted.
    pub fn drop_table(&mut self, models: &[ModelDefinition]) -> CoreResult<()> {
        for model in models {
            model.ensure_valid()?;
            self.txn
                .delete_bucket(&model.table_name)
                .map_err(|err| CoreError::BucketDeleteFailed {
                    name: model.table_name.clone(),
                    reason: err.to_string(),
                })?;
            tracing::debug!(bucket = %model.table_name, "dropped bucket");
        }
        Ok(())
    }

    /// Returns the model definition of `E`.
    pub fn get_model_definition<E: Entity>(&self) -> CoreResult<ModelDefinition> {
        model_for::<E>()
    }

    /// Loads the record stored under `id`.
    pub fn get<E: Entity>(&self, id: u64) -> CoreResult<Option<E>> {
        read::get(&self.txn, &model_for::<E>()?, id)
    }

    /// Loads every record of `E` in key order.
    pub fn scan<E: Entity>(&self) -> CoreResult<Vec<E>> {
        read::scan(&self.txn, &model_for::<E>()?)
    }

    /// Counts the records of `E`.
    pub fn count<E: Entity>(&self) -> CoreResult<usize> {
        read::count(&self.txn, &model_for::<E>()?)
    }

    /// Latest recorded identity hash and schema version.
    ///
    /// # Errors
    ///
    /// `NoSuchTable` if the metadata bucket does not exist.
    pub fn latest_identity_and_version(&self) -> CoreResult<(String, VersionNumber)> {
        metadata::latest(&self.txn)
    }

    /// Every schema record in write order.
    pub fn history(&self) -> CoreResult<Vec<SchemaRecord>> {
        metadata::history(&self.txn)
    }

    /// Appends a schema record.
    pub fn record_schema_version(
        &mut self,
        identity_hash: &str,
        version: VersionNumber,
    ) -> CoreResult<SchemaRecord> {
        metadata::append(&mut self.txn, identity_hash, version)
    }

    /// Creates the metadata bucket if it is missing. Returns whether it was
    /// created.
    pub fn ensure_metadata_bucket(&mut self) -> CoreResult<bool> {
        metadata::ensure_bucket(&mut self.txn)
    }

    /// Raw `(id, bytes)` pairs of the model's bucket, in key order.
    pub fn raw_records(&self, model: &ModelDefinition) -> CoreResult<Vec<(u64, Vec<u8>)>> {
        let table = self.existing_table(model)?;
        self.txn
            .entries(table)?
            .map(|(key, value)| Ok((record_id(table, key)?, value.to_vec())))
            .collect()
    }

    /// Writes raw bytes under `id`, replacing any existing record.
    pub fn put_raw(&mut self, model: &ModelDefinition, id: u64, bytes: &[u8]) -> CoreResult<()> {
        let table = self.existing_table(model)?;
        self.txn.put(table, &encode_key(id), bytes)
    }

    /// Rewrites every record of the model's bucket through `f`, keeping each
    /// record's identifier. Returns the number of records rewritten.
    ///
    /// ```rust
    /// # use roomdb_core::{BucketDb, ModelDefinition, ObjectStoreAdapter};
    /// # use std::sync::Arc;
    /// # let adapter = ObjectStoreAdapter::new(Arc::new(BucketDb::open_in_memory().unwrap()));
    /// let user = ModelDefinition::new("User", vec![]);
    /// adapter.create_table(&[user.clone()]).unwrap();
    /// adapter
    ///     .do_in_transaction(|tx| {
    ///         tx.transform_records(&user, |_, mut value| {
    ///             value["Score"] = 10.into();
    ///             Ok(value)
    ///         })
    ///     })
    ///     .unwrap();
    /// ```
    pub fn transform_records<F>(&mut self, model: &ModelDefinition, mut f: F) -> CoreResult<usize>
    where
        F: FnMut(u64, serde_json::Value) -> CoreResult<serde_json::Value>,
    {
        let records = self.raw_records(model)?;
        let table = model.table_name.as_str();
        for (id, bytes) in &records {
            let value: serde_json::Value = serde_json::from_slice(bytes)?;
            let rewritten = serde_json::to_vec(&f(*id, value)?)?;
            self.txn.put(table, &encode_key(*id), &rewritten)?;
        }
        Ok(records.len())
    }

    fn existing_table<'m>(&self, model: &'m ModelDefinition) -> CoreResult<&'m str> {
        model.ensure_valid()?;
        if !self.txn.bucket_exists(&model.table_name) {
            return Err(CoreError::no_such_table(&model.table_name));
        }
        Ok(&model.table_name)
    }
}

impl std::fmt::Debug for TxStore<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxStore")
            .field("txn", &self.txn)
            .finish()
    }
}

fn record_id(table: &str, key: &[u8]) -> CoreResult<u64> {
    decode_key(key).ok_or_else(|| {
        CoreError::invalid_operation(format!(
            "bucket {table} holds a {}-byte key, expected 8",
            key.len()
        ))
    })
}
