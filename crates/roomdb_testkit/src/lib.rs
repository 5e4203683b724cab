//! # RoomDB Testkit
//!
//! Test utilities for RoomDB.
//!
//! This crate provides:
//! - Temporary in-memory and file-backed stores
//! - A versioned sample `User` schema with its migration registry
//! - Property-based test generators using proptest
//! - A tracing subscriber for test output
//!
//! ## Usage
//!
//! ```rust
//! use roomdb_testkit::prelude::*;
//!
//! let store = TestStore::memory();
//! let room = users_room(&store, 1);
//! room.initialize(InitOptions::default()).unwrap();
//!
//! let mut user = users::v1::User::new("ana");
//! store.adapter.create(&mut user).unwrap();
//! assert_eq!(user.id, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::init_test_logging;
    pub use roomdb_core::{InitOptions, InitOutcome, ObjectStoreAdapter, Room};
}

pub use fixtures::*;
pub use generators::*;
