//! # RoomDB Storage
//!
//! Byte-store backends underneath the RoomDB commit log.
//!
//! A backend knows nothing about buckets, records or transactions. It is an
//! append-only byte sequence that can be read back, made durable, and cut
//! back to a previous length when recovery finds a torn tail.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - Ephemeral storage; clones share the same bytes so
//!   tests can "reopen" a store after simulating a crash
//! - [`FileBackend`] - A single file, optionally guarded by an exclusive
//!   advisory lock
//!
//! ## Example
//!
//! ```rust
//! use roomdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
