//! Error types for RoomDB core.

use crate::types::VersionNumber;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in RoomDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] roomdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The value is absent or is not a structured record.
    #[error("invalid entity: {message}")]
    InvalidEntity {
        /// Why the entity was rejected.
        message: String,
    },

    /// The derived model definition has no bucket name.
    #[error("invalid model definition: {message}")]
    InvalidModel {
        /// Why the model was rejected.
        message: String,
    },

    /// No bucket exists for the entity.
    #[error("no such table: {name}")]
    NoSuchTable {
        /// Bucket name.
        name: String,
    },

    /// A bucket could not be created.
    #[error("unable to create bucket {name}: {reason}")]
    BucketCreateFailed {
        /// Bucket name.
        name: String,
        /// Underlying failure.
        reason: String,
    },

    /// A bucket could not be deleted.
    #[error("unable to delete bucket {name}: {reason}")]
    BucketDeleteFailed {
        /// Bucket name.
        name: String,
        /// Underlying failure.
        reason: String,
    },

    /// An entity could not be encoded or decoded.
    #[error("serialization failed: {message}")]
    SerializationFailed {
        /// Encoder or decoder message.
        message: String,
    },

    /// A schema metadata record could not be read.
    #[error("corrupt schema metadata at key {key}: {message}")]
    CorruptMetadata {
        /// Key of the unreadable record.
        key: u64,
        /// Decoder message.
        message: String,
    },

    /// No contiguous chain of migrations bridges the two versions.
    #[error("no migration path from version {from} to version {to}")]
    MigrationGap {
        /// Recorded version.
        from: VersionNumber,
        /// Expected version.
        to: VersionNumber,
    },

    /// A migration step returned an error.
    #[error("migration {base} -> {target} failed: {source}")]
    MigrationStepFailed {
        /// Base version of the failed step.
        base: VersionNumber,
        /// Target version of the failed step.
        target: VersionNumber,
        /// The step's error.
        #[source]
        source: Box<CoreError>,
    },

    /// A migration was rejected at registration.
    #[error("invalid migration: {message}")]
    InvalidMigration {
        /// Why the migration was rejected.
        message: String,
    },

    /// Same version on disk, but the registered entity shapes changed.
    #[error("identity hash mismatch at version {version}: recorded {recorded}, computed {computed}")]
    IdentityMismatch {
        /// Recorded and expected version.
        version: VersionNumber,
        /// Hash found in the metadata bucket.
        recorded: String,
        /// Hash of the registered entities.
        computed: String,
    },

    /// The store was written by a newer schema version.
    #[error("recorded schema version {recorded} is newer than expected version {expected}")]
    VersionDowngrade {
        /// Version found in the metadata bucket.
        recorded: VersionNumber,
        /// Version the application expects.
        expected: VersionNumber,
    },

    /// Invalid initialization parameters.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },

    /// Store-level: bucket already exists.
    #[error("bucket already exists: {name}")]
    BucketExists {
        /// Bucket name.
        name: String,
    },

    /// Store-level: bucket does not exist.
    #[error("bucket not found: {name}")]
    BucketNotFound {
        /// Bucket name.
        name: String,
    },

    /// A transaction was requested on a thread that already holds the write
    /// transaction.
    #[error("nested transaction: this thread already holds the write transaction")]
    NestedTransaction,

    /// The commit log is damaged.
    #[error("commit log corruption at offset {offset}: {message}")]
    LogCorruption {
        /// Offset of the damaged frame.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// A commit-log frame failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the frame.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Another handle holds the store lock.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid entity error.
    pub fn invalid_entity(message: impl Into<String>) -> Self {
        Self::InvalidEntity {
            message: message.into(),
        }
    }

    /// Creates an invalid model error.
    pub fn invalid_model(message: impl Into<String>) -> Self {
        Self::InvalidModel {
            message: message.into(),
        }
    }

    /// Creates a no such table error.
    pub fn no_such_table(name: impl Into<String>) -> Self {
        Self::NoSuchTable { name: name.into() }
    }

    /// Creates a serialization failed error.
    pub fn serialization_failed(message: impl Into<String>) -> Self {
        Self::SerializationFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid migration error.
    pub fn invalid_migration(message: impl Into<String>) -> Self {
        Self::InvalidMigration {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a commit log corruption error.
    pub fn log_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps a migration step failure.
    pub fn migration_step_failed(
        base: VersionNumber,
        target: VersionNumber,
        source: CoreError,
    ) -> Self {
        Self::MigrationStepFailed {
            base,
            target,
            source: Box::new(source),
        }
    }

    /// Returns true for failures a destructive reset is allowed to recover
    /// from.
    #[must_use]
    pub fn is_schema_conflict(&self) -> bool {
        matches!(
            self,
            Self::MigrationGap { .. }
                | Self::MigrationStepFailed { .. }
                | Self::IdentityMismatch { .. }
                | Self::VersionDowngrade { .. }
                | Self::CorruptMetadata { .. }
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_failed(err.to_string())
    }
}
