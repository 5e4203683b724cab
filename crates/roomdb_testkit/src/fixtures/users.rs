//! Versioned sample `User` schema.
//!
//! | version | stored fields                  |
//! |---------|--------------------------------|
//! | 1       | `ID`, `Name`                   |
//! | 2       | `ID`, `username`               |
//! | 3       | `ID`, `username`, `Score`      |
//!
//! [`migrations`] registers the 1→2 key rename and the 2→3 default score.

use super::TestStore;
use roomdb_core::{
    model_of, CoreError, CoreResult, FnMigration, MigrationRegistry, ModelDefinition, Room,
};
use serde_json::Value;

/// Score given to users migrated into version 3.
pub const DEFAULT_SCORE: i64 = 10;

/// Version 1: the first stored layout.
pub mod v1 {
    use roomdb_core::{Entity, EntitySchema};
    use serde::{Deserialize, Serialize};

    /// A user as first stored.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct User {
        /// Store-assigned identifier.
        #[serde(rename = "ID")]
        pub id: u64,
        /// Display name.
        #[serde(rename = "Name")]
        pub name: String,
    }

    impl User {
        /// Creates an unsaved user.
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                id: 0,
                name: name.into(),
            }
        }
    }

    impl Entity for User {
        fn schema() -> EntitySchema {
            EntitySchema::record::<Self>()
                .typed_field::<u64>("ID", "")
                .typed_field::<String>("Name", "")
        }

        fn id(&self) -> Option<u64> {
            Some(self.id)
        }

        fn id_mut(&mut self) -> Option<&mut u64> {
            Some(&mut self.id)
        }
    }
}

/// Version 2: the name is stored under `username`.
pub mod v2 {
    use roomdb_core::{Entity, EntitySchema};
    use serde::{Deserialize, Serialize};

    /// A user with the renamed key.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct User {
        /// Store-assigned identifier.
        #[serde(rename = "ID")]
        pub id: u64,
        /// Display name.
        #[serde(rename = "username")]
        pub name: String,
    }

    impl Entity for User {
        fn schema() -> EntitySchema {
            EntitySchema::record::<Self>()
                .typed_field::<u64>("ID", "")
                .typed_field::<String>("Name", r#"json:"username""#)
        }

        fn id(&self) -> Option<u64> {
            Some(self.id)
        }

        fn id_mut(&mut self) -> Option<&mut u64> {
            Some(&mut self.id)
        }
    }
}

/// Version 3: adds a score.
pub mod v3 {
    use roomdb_core::{Entity, EntitySchema};
    use serde::{Deserialize, Serialize};

    /// A user with a score.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct User {
        /// Store-assigned identifier.
        #[serde(rename = "ID")]
        pub id: u64,
        /// Display name.
        #[serde(rename = "username")]
        pub name: String,
        /// Game score.
        #[serde(rename = "Score")]
        pub score: i64,
    }

    impl User {
        /// Creates an unsaved user.
        pub fn new(name: impl Into<String>, score: i64) -> Self {
            Self {
                id: 0,
                name: name.into(),
                score,
            }
        }
    }

    impl Entity for User {
        fn schema() -> EntitySchema {
            EntitySchema::record::<Self>()
                .typed_field::<u64>("ID", "")
                .typed_field::<String>("Name", r#"json:"username""#)
                .typed_field::<i64>("Score", "")
        }

        fn id(&self) -> Option<u64> {
            Some(self.id)
        }

        fn id_mut(&mut self) -> Option<&mut u64> {
            Some(&mut self.id)
        }
    }
}

/// Model definitions registered at `version`.
///
/// # Panics
///
/// Panics for versions other than 1, 2 and 3.
pub fn models(version: u32) -> Vec<ModelDefinition> {
    let model = match version {
        1 => model_of::<v1::User>(),
        2 => model_of::<v2::User>(),
        3 => model_of::<v3::User>(),
        other => panic!("no User schema for version {other}"),
    };
    vec![model.expect("User models are valid")]
}

/// The 1→2 and 2→3 migrations.
pub fn migrations() -> MigrationRegistry {
    let rename = FnMigration::new(1, 2, |tx| {
        let user = model_of::<v1::User>()?;
        tx.transform_records(&user, rename_name_key)?;
        Ok(())
    })
    .named("rename Name to username");

    let score = FnMigration::new(2, 3, |tx| {
        let user = model_of::<v2::User>()?;
        tx.transform_records(&user, |_, value| add_default_score(value))?;
        Ok(())
    })
    .named("add Score");

    MigrationRegistry::new()
        .with(rename)
        .and_then(|registry| registry.with(score))
        .expect("User migrations form a valid chain")
}

/// A room over `store` expecting the `User` schema at `version`.
pub fn users_room(store: &TestStore, version: u32) -> Room {
    Room::new(
        models(version),
        store.adapter.clone(),
        version,
        migrations(),
    )
    .expect("User room is valid")
}

fn rename_name_key(id: u64, mut value: Value) -> CoreResult<Value> {
    let object = record_object(id, &mut value)?;
    if let Some(name) = object.remove("Name") {
        object.insert("username".to_string(), name);
    }
    Ok(value)
}

fn add_default_score(mut value: Value) -> CoreResult<Value> {
    if let Some(object) = value.as_object_mut() {
        object
            .entry("Score")
            .or_insert_with(|| Value::from(DEFAULT_SCORE));
    }
    Ok(value)
}

fn record_object(id: u64, value: &mut Value) -> CoreResult<&mut serde_json::Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| CoreError::invalid_operation(format!("User {id} is not a JSON object")))
}
