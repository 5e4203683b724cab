//! Schema migrations.
//!
//! A migration moves the stored records from one schema version to the next.
//! Migrations are:
//! - **Code-defined**: registered at startup, never persisted
//! - **Forward-only**: `target_version` is always greater than `base_version`
//! - **Transactional**: each step runs in its own write transaction and
//!   records its target version in that same transaction
//!
//! ## Usage
//!
//! ```rust
//! use roomdb_core::{FnMigration, MigrationRegistry, ModelDefinition, VersionNumber};
//!
//! let mut registry = MigrationRegistry::new();
//! registry
//!     .register(Box::new(FnMigration::new(1, 2, |tx| {
//!         let user = ModelDefinition::new("User", vec![]);
//!         tx.transform_records(&user, |_, mut value| {
//!             value["Score"] = 10.into();
//!             Ok(value)
//!         })?;
//!         Ok(())
//!     })))
//!     .unwrap();
//!
//! let plan = registry.plan(VersionNumber::new(1), VersionNumber::new(2)).unwrap();
//! assert_eq!(plan.len(), 1);
//! ```

use crate::adapter::TxStore;
use crate::error::{CoreError, CoreResult};
use crate::types::VersionNumber;
use std::collections::BTreeMap;

/// Information about a registered migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    /// Version the migration starts from.
    pub base_version: VersionNumber,
    /// Version the migration produces.
    pub target_version: VersionNumber,
    /// Human-readable name.
    pub name: String,
}

/// A versioned transformation of stored records.
pub trait Migration: Send + Sync {
    /// Version the migration starts from.
    fn base_version(&self) -> VersionNumber;

    /// Version the migration produces.
    fn target_version(&self) -> VersionNumber;

    /// Returns the name of this migration.
    fn name(&self) -> String {
        format!("{}->{}", self.base_version(), self.target_version())
    }

    /// Transforms the stored records. Runs inside the step's transaction;
    /// returning an error rolls the step back.
    fn apply(&self, tx: &mut TxStore<'_>) -> CoreResult<()>;
}

type ApplyFn = dyn Fn(&mut TxStore<'_>) -> CoreResult<()> + Send + Sync;

/// A migration backed by a closure.
pub struct FnMigration {
    base: VersionNumber,
    target: VersionNumber,
    name: Option<String>,
    apply: Box<ApplyFn>,
}

impl FnMigration {
    /// Creates a migration from `base` to `target`.
    pub fn new<F>(base: u32, target: u32, apply: F) -> Self
    where
        F: Fn(&mut TxStore<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        Self {
            base: VersionNumber::new(base),
            target: VersionNumber::new(target),
            name: None,
            apply: Box::new(apply),
        }
    }

    /// Sets a descriptive name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Migration for FnMigration {
    fn base_version(&self) -> VersionNumber {
        self.base
    }

    fn target_version(&self) -> VersionNumber {
        self.target
    }

    fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}->{}", self.base, self.target))
    }

    fn apply(&self, tx: &mut TxStore<'_>) -> CoreResult<()> {
        (self.apply)(tx)
    }
}

impl std::fmt::Debug for FnMigration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMigration")
            .field("base", &self.base)
            .field("target", &self.target)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registered migrations, keyed by base version.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: BTreeMap<VersionNumber, Box<dyn Migration>>,
}

impl MigrationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a migration.
    ///
    /// # Errors
    ///
    /// `InvalidMigration` if the target is not above the base, or if a
    /// migration from the same base version is already registered.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> CoreResult<()> {
        let base = migration.base_version();
        let target = migration.target_version();
        if target <= base {
            return Err(CoreError::invalid_migration(format!(
                "migration {} must move forward, got {base} -> {target}",
                migration.name()
            )));
        }
        if let Some(existing) = self.migrations.get(&base) {
            return Err(CoreError::invalid_migration(format!(
                "a migration from version {base} is already registered ({})",
                existing.name()
            )));
        }
        self.migrations.insert(base, migration);
        Ok(())
    }

    /// Builder form of [`MigrationRegistry::register`].
    pub fn with(mut self, migration: impl Migration + 'static) -> CoreResult<Self> {
        self.register(Box::new(migration))?;
        Ok(self)
    }

    /// Returns the number of registered migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Returns registered migrations ordered by base version.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.migrations
            .values()
            .map(|m| MigrationInfo {
                base_version: m.base_version(),
                target_version: m.target_version(),
                name: m.name(),
            })
            .collect()
    }

    /// Chains migrations from `from` to exactly `to`, each step starting at
    /// the previous step's target.
    ///
    /// # Errors
    ///
    /// `MigrationGap` if no contiguous chain exists.
    pub fn plan(&self, from: VersionNumber, to: VersionNumber) -> CoreResult<Vec<&dyn Migration>> {
        let gap = || CoreError::MigrationGap { from, to };
        let mut steps = Vec::new();
        let mut current = from;

        while current < to {
            let step = self.migrations.get(&current).ok_or_else(gap)?;
            if step.target_version() > to {
                return Err(gap());
            }
            current = step.target_version();
            steps.push(step.as_ref());
        }

        if current != to {
            return Err(gap());
        }
        Ok(steps)
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.list()).finish()
    }
}
