//! Core type definitions for RoomDB.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema version number.
///
/// Version 0 means the store has never been initialized. Application
/// schemas start at 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VersionNumber(pub u32);

impl VersionNumber {
    /// The version of a store that was never initialized.
    pub const UNINITIALIZED: Self = Self(0);

    /// Creates a version number.
    #[must_use]
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true for the uninitialized version.
    #[must_use]
    pub const fn is_uninitialized(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for VersionNumber {
    fn from(version: u32) -> Self {
        Self(version)
    }
}

/// Identifier of a store transaction, monotonically increasing per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Encodes a sequence number as a bucket key (8 bytes, big-endian).
///
/// Big-endian keeps byte order equal to numeric order, so iterating a bucket
/// visits records in allocation order.
#[must_use]
pub const fn encode_key(sequence: u64) -> [u8; 8] {
    sequence.to_be_bytes()
}

/// Decodes a bucket key produced by [`encode_key`].
#[must_use]
pub fn decode_key(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
