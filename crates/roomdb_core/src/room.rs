//! Versioned schema initialization.
//!
//! [`Room`] ties a set of entity models, an expected schema version and a
//! migration registry to an [`ObjectStoreAdapter`]. [`Room::initialize`]
//! compares the version recorded in the store with the expected one and
//! creates, verifies, migrates or (when allowed) resets the store.

use crate::adapter::{ObjectStoreAdapter, TxStore};
use crate::config::InitOptions;
use crate::error::{CoreError, CoreResult};
use crate::identity::identity_hash;
use crate::metadata::SCHEMA_MASTER_BUCKET;
use crate::migration::{MigrationInfo, MigrationRegistry};
use crate::model::ModelDefinition;
use crate::types::VersionNumber;
use std::collections::BTreeSet;
use std::slice;

/// What [`Room::initialize`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// The store had no schema; buckets and metadata were created.
    Created {
        /// Recorded version.
        version: VersionNumber,
    },
    /// The recorded schema already matched.
    UpToDate {
        /// Recorded version.
        version: VersionNumber,
    },
    /// Migrations were applied.
    Migrated {
        /// Version before the first step.
        from: VersionNumber,
        /// Version after the last step.
        to: VersionNumber,
        /// Names of the applied steps in order.
        applied: Vec<String>,
    },
    /// Entity buckets were dropped and recreated empty.
    DestructiveReset {
        /// Version found in the store.
        from: VersionNumber,
        /// Version recorded after the reset.
        to: VersionNumber,
        /// The failure that triggered the reset.
        reason: String,
    },
}

impl InitOutcome {
    /// Schema version of the store after initialization.
    #[must_use]
    pub fn version(&self) -> VersionNumber {
        match self {
            Self::Created { version } | Self::UpToDate { version } => *version,
            Self::Migrated { to, .. } | Self::DestructiveReset { to, .. } => *to,
        }
    }
}

/// The decision [`Room::initialize`] acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitPlan {
    /// No schema recorded: create everything.
    Fresh,
    /// Recorded schema matches.
    UpToDate,
    /// Run these steps in order.
    Migrate {
        /// Recorded version.
        from: VersionNumber,
        /// Steps to apply.
        steps: Vec<MigrationInfo>,
    },
}

/// A versioned set of entity buckets.
pub struct Room {
    adapter: ObjectStoreAdapter,
    entities: Vec<ModelDefinition>,
    version: VersionNumber,
    registry: MigrationRegistry,
    identity_hash: String,
}

impl Room {
    /// Creates a room.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for an empty entity list, version 0, a duplicate
    ///   table name or the reserved metadata bucket name
    /// - `InvalidModel` for a model without a table name
    pub fn new(
        entities: Vec<ModelDefinition>,
        adapter: ObjectStoreAdapter,
        version: u32,
        registry: MigrationRegistry,
    ) -> CoreResult<Self> {
        let version = VersionNumber::new(version);
        if entities.is_empty() {
            return Err(CoreError::invalid_config("a room needs at least one entity"));
        }
        if version.is_uninitialized() {
            return Err(CoreError::invalid_config("schema versions start at 1"));
        }

        let mut seen = BTreeSet::new();
        for model in &entities {
            model.ensure_valid()?;
            if model.table_name == SCHEMA_MASTER_BUCKET {
                return Err(CoreError::invalid_config(format!(
                    "{SCHEMA_MASTER_BUCKET} is reserved"
                )));
            }
            if !seen.insert(model.table_name.as_str()) {
                return Err(CoreError::invalid_config(format!(
                    "entity {} registered twice",
                    model.table_name
                )));
            }
        }

        let identity_hash = identity_hash(&entities);
        Ok(Self {
            adapter,
            entities,
            version,
            registry,
            identity_hash,
        })
    }

    /// Returns the adapter.
    #[must_use]
    pub fn adapter(&self) -> &ObjectStoreAdapter {
        &self.adapter
    }

    /// Returns the registered models.
    #[must_use]
    pub fn entities(&self) -> &[ModelDefinition] {
        &self.entities
    }

    /// Returns the expected schema version.
    #[must_use]
    pub fn version(&self) -> VersionNumber {
        self.version
    }

    /// Returns the identity hash of the registered models.
    #[must_use]
    pub fn identity_hash(&self) -> &str {
        &self.identity_hash
    }

    /// Returns the migration registry.
    #[must_use]
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Decides what [`Room::initialize`] would do given the latest recorded
    /// `(identity hash, version)`, or `None` if the metadata bucket does not
    /// exist. Reads and writes nothing.
    ///
    /// # Errors
    ///
    /// `IdentityMismatch`, `VersionDowngrade` or `MigrationGap`.
    pub fn plan(&self, recorded: Option<(&str, VersionNumber)>) -> CoreResult<InitPlan> {
        let Some((hash, from)) = recorded else {
            return Ok(InitPlan::Fresh);
        };

        if from.is_uninitialized() {
            return Ok(InitPlan::Fresh);
        }
        if from > self.version {
            return Err(CoreError::VersionDowngrade {
                recorded: from,
                expected: self.version,
            });
        }
        if from == self.version {
            // An empty hash is left by an intermediate migration step.
            if hash.is_empty() || hash == self.identity_hash {
                return Ok(InitPlan::UpToDate);
            }
            return Err(CoreError::IdentityMismatch {
                version: from,
                recorded: hash.to_string(),
                computed: self.identity_hash.clone(),
            });
        }

        let steps = self
            .registry
            .plan(from, self.version)?
            .into_iter()
            .map(|m| MigrationInfo {
                base_version: m.base_version(),
                target_version: m.target_version(),
                name: m.name(),
            })
            .collect();
        Ok(InitPlan::Migrate { from, steps })
    }

    /// Brings the store to the expected schema version.
    ///
    /// # Errors
    ///
    /// Schema conflicts (`MigrationGap`, `MigrationStepFailed`,
    /// `IdentityMismatch`, `VersionDowngrade`, `CorruptMetadata`) are returned
    /// unless `options.fallback_to_destructive_migration` is set, in which
    /// case every entity bucket is dropped and recreated instead.
    pub fn initialize(&self, options: InitOptions) -> CoreResult<InitOutcome> {
        let recorded = match self.adapter.latest_identity_and_version() {
            Ok(recorded) => Some(recorded),
            Err(CoreError::NoSuchTable { .. }) => None,
            Err(err) if err.is_schema_conflict() => {
                return self.fallback(options, VersionNumber::UNINITIALIZED, err);
            }
            Err(err) => return Err(err),
        };
        let from = recorded
            .as_ref()
            .map_or(VersionNumber::UNINITIALIZED, |(_, version)| *version);

        let result = match self.plan(recorded.as_ref().map(|(h, v)| (h.as_str(), *v))) {
            Ok(InitPlan::Fresh) => self.create_fresh(),
            Ok(InitPlan::UpToDate) => self.confirm_up_to_date(recorded.as_ref()),
            Ok(InitPlan::Migrate { from, .. }) => self.migrate(from),
            Err(err) => Err(err),
        };

        match result {
            Err(err) if err.is_schema_conflict() => self.fallback(options, from, err),
            other => other,
        }
    }

    fn confirm_up_to_date(
        &self,
        recorded: Option<&(String, VersionNumber)>,
    ) -> CoreResult<InitOutcome> {
        if recorded.map_or(false, |(hash, _)| hash.is_empty()) {
            self.adapter
                .record_schema_version(&self.identity_hash, self.version)?;
            tracing::info!(version = %self.version, "recorded identity for intermediate version");
        } else {
            tracing::info!(version = %self.version, "schema up to date");
        }
        Ok(InitOutcome::UpToDate {
            version: self.version,
        })
    }

    fn create_fresh(&self) -> CoreResult<InitOutcome> {
        self.adapter.do_in_transaction(|tx| {
            tx.ensure_metadata_bucket()?;
            self.create_missing_buckets(tx)?;
            tx.record_schema_version(&self.identity_hash, self.version)
        })?;

        tracing::info!(
            version = %self.version,
            entities = self.entities.len(),
            "created schema"
        );
        Ok(InitOutcome::Created {
            version: self.version,
        })
    }

    fn migrate(&self, from: VersionNumber) -> CoreResult<InitOutcome> {
        let steps = self.registry.plan(from, self.version)?;
        let mut applied = Vec::with_capacity(steps.len());

        for step in steps {
            let base = step.base_version();
            let target = step.target_version();
            let is_last = target == self.version;

            self.adapter
                .do_in_transaction(|tx| {
                    let (_, current) = tx.latest_identity_and_version()?;
                    if current != base {
                        return Err(CoreError::invalid_operation(format!(
                            "schema moved to version {current} while migrating"
                        )));
                    }

                    step.apply(tx)?;
                    if is_last {
                        self.create_missing_buckets(tx)?;
                        tx.record_schema_version(&self.identity_hash, target)?;
                    } else {
                        tx.record_schema_version("", target)?;
                    }
                    Ok(())
                })
                .map_err(|err| CoreError::migration_step_failed(base, target, err))?;

            tracing::info!(step = %step.name(), %base, %target, "applied migration");
            applied.push(step.name());
        }

        tracing::info!(%from, to = %self.version, steps = applied.len(), "schema migrated");
        Ok(InitOutcome::Migrated {
            from,
            to: self.version,
            applied,
        })
    }

    fn fallback(
        &self,
        options: InitOptions,
        from: VersionNumber,
        reason: CoreError,
    ) -> CoreResult<InitOutcome> {
        if !options.fallback_to_destructive_migration {
            return Err(reason);
        }

        tracing::warn!(
            %from,
            to = %self.version,
            reason = %reason,
            "destructive migration: dropping all entity buckets"
        );

        let corrupt_metadata = matches!(reason, CoreError::CorruptMetadata { .. });
        self.adapter.do_in_transaction(|tx| {
            for model in &self.entities {
                if tx.has_bucket(model)? {
                    tx.drop_table(slice::from_ref(model))?;
                }
            }
            tx.create_table(&self.entities)?;

            if corrupt_metadata {
                // History that cannot be read is not worth keeping.
                tx.drop_table(&[ModelDefinition::new(SCHEMA_MASTER_BUCKET, Vec::new())])?;
            }
            tx.ensure_metadata_bucket()?;
            tx.record_schema_version(&self.identity_hash, self.version)?;
            Ok(())
        })?;

        Ok(InitOutcome::DestructiveReset {
            from,
            to: self.version,
            reason: reason.to_string(),
        })
    }

    fn create_missing_buckets(&self, tx: &mut TxStore<'_>) -> CoreResult<()> {
        for model in &self.entities {
            if !tx.has_bucket(model)? {
                tx.create_table(slice::from_ref(model))?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("entities", &self.entities.len())
            .field("version", &self.version)
            .field("identity_hash", &self.identity_hash)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
