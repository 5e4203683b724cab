//! # RoomDB Core
//!
//! Versioned entity persistence for RoomDB.
//!
//! This crate provides:
//! - An embedded bucket store ([`BucketDb`]) with single-writer
//!   transactions and an append-only commit log
//! - Entity descriptors and model definitions ([`Entity`], [`inspect`])
//! - Entity-level bucket access ([`ObjectStoreAdapter`], [`TxStore`])
//! - Schema metadata, ordered migrations and versioned initialization
//!   ([`Room`])
//!
//! ## Example
//!
//! ```rust
//! use roomdb_core::{
//!     model_of, BucketDb, Entity, EntitySchema, InitOptions, InitOutcome,
//!     MigrationRegistry, ObjectStoreAdapter, Room,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Task {
//!     id: u64,
//!     title: String,
//! }
//!
//! impl Entity for Task {
//!     fn schema() -> EntitySchema {
//!         EntitySchema::record::<Self>()
//!             .typed_field::<u64>("ID", "")
//!             .typed_field::<String>("Title", "")
//!     }
//!
//!     fn id_mut(&mut self) -> Option<&mut u64> {
//!         Some(&mut self.id)
//!     }
//! }
//!
//! let adapter = ObjectStoreAdapter::new(Arc::new(BucketDb::open_in_memory().unwrap()));
//! let room = Room::new(
//!     vec![model_of::<Task>().unwrap()],
//!     adapter.clone(),
//!     1,
//!     MigrationRegistry::new(),
//! )
//! .unwrap();
//!
//! let outcome = room.initialize(InitOptions::default()).unwrap();
//! assert!(matches!(outcome, InitOutcome::Created { .. }));
//!
//! let mut task = Task { id: 0, title: "write docs".into() };
//! adapter.create(&mut task).unwrap();
//! assert_eq!(task.id, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
mod config;
mod error;
mod identity;
pub mod kv;
mod metadata;
mod migration;
pub mod model;
mod room;
mod types;

pub use adapter::{ObjectStoreAdapter, TxStore};
pub use config::{InitOptions, StoreConfig};
pub use error::{CoreError, CoreResult};
pub use identity::identity_hash;
pub use kv::{BucketDb, ReadTxn, Snapshot, WriteTxn};
pub use metadata::{SchemaRecord, SCHEMA_MASTER_BUCKET};
pub use migration::{FnMigration, Migration, MigrationInfo, MigrationRegistry};
pub use model::{
    inspect, model_of, Entity, EntitySchema, FieldDescriptor, FieldSpec, ModelDefinition, Shape,
};
pub use room::{InitOutcome, InitPlan, Room};
pub use types::{decode_key, encode_key, TransactionId, VersionNumber};
