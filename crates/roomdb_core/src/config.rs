//! Store and initialization configuration.

/// Configuration for opening a [`crate::BucketDb`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the store file if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the commit log on every commit (safer but slower).
    /// When false, commits are only flushed to the OS.
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}

/// Options for [`crate::Room::initialize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Drop and recreate every entity bucket when the recorded schema cannot
    /// be migrated to the expected one. Off by default; existing data is
    /// lost when it triggers.
    pub fallback_to_destructive_migration: bool,
}

impl InitOptions {
    /// Creates options with destructive fallback disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opts in to destructive fallback.
    #[must_use]
    pub const fn fallback_to_destructive_migration(mut self, value: bool) -> Self {
        self.fallback_to_destructive_migration = value;
        self
    }
}
