//! Entity descriptors and model definitions.
//!
//! Entities describe themselves through [`Entity::schema`]; [`inspect`] turns
//! that descriptor into the [`ModelDefinition`] the bucket store uses to name
//! buckets and the migration runner uses to compute the identity hash.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// An application record that can be stored in a bucket.
///
/// # Example
///
/// ```rust
/// use roomdb_core::{inspect, Entity, EntitySchema};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     #[serde(rename = "ID")]
///     id: u64,
///     #[serde(rename = "Name")]
///     name: String,
/// }
///
/// impl Entity for User {
///     fn schema() -> EntitySchema {
///         EntitySchema::record::<Self>()
///             .typed_field::<u64>("ID", "")
///             .typed_field::<String>("Name", r#"json:"name""#)
///     }
///
///     fn id(&self) -> Option<u64> {
///         Some(self.id)
///     }
///
///     fn id_mut(&mut self) -> Option<&mut u64> {
///         Some(&mut self.id)
///     }
/// }
///
/// let model = inspect(&User::schema()).unwrap();
/// assert_eq!(model.table_name, "User");
/// assert_eq!(model.field_names(), vec!["ID:u64", "Name:String"]);
/// ```
pub trait Entity: Serialize + DeserializeOwned {
    /// Describes the entity's shape and externally visible fields.
    fn schema() -> EntitySchema;

    /// Returns the numeric identifier, if the entity has one.
    fn id(&self) -> Option<u64> {
        None
    }

    /// Returns the settable identifier field. Entities without one keep
    /// their value untouched when the store assigns a key.
    fn id_mut(&mut self) -> Option<&mut u64> {
        None
    }
}

impl<E: Entity> Entity for Box<E> {
    fn schema() -> EntitySchema {
        E::schema()
    }

    fn id(&self) -> Option<u64> {
        (**self).id()
    }

    fn id_mut(&mut self) -> Option<&mut u64> {
        (**self).id_mut()
    }
}

/// Structural kind of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A struct with named fields.
    Record,
    /// A scalar such as an integer or string.
    Primitive,
    /// A sequence or map.
    Collection,
}

/// One declared field of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name as it appears in the model.
    pub name: String,
    /// Declared type name.
    pub type_name: String,
    /// Free-form tag metadata; carried, never interpreted.
    pub tag: String,
    /// Hidden fields are left out of the model definition.
    pub visible: bool,
}

/// Compile-time description of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    /// Full type name, possibly with module path, generics and indirection.
    pub type_name: String,
    /// Structural kind.
    pub shape: Shape,
    /// Declared fields in declaration order.
    pub fields: Vec<FieldSpec>,
}

impl EntitySchema {
    /// Starts a record schema named after `T`.
    #[must_use]
    pub fn record<T: ?Sized>() -> Self {
        Self::named(std::any::type_name::<T>(), Shape::Record)
    }

    /// Starts a schema with an explicit type name and shape.
    #[must_use]
    pub fn named(type_name: impl Into<String>, shape: Shape) -> Self {
        Self {
            type_name: type_name.into(),
            shape,
            fields: Vec::new(),
        }
    }

    /// Adds a visible field.
    #[must_use]
    pub fn field(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            type_name: type_name.into(),
            tag: tag.into(),
            visible: true,
        });
        self
    }

    /// Adds a visible field whose type name is taken from `T`.
    #[must_use]
    pub fn typed_field<T: ?Sized>(self, name: impl Into<String>, tag: impl Into<String>) -> Self {
        let type_name = bare_type_name(std::any::type_name::<T>()).to_string();
        self.field(name, type_name, tag)
    }

    /// Adds a field that is not externally visible.
    #[must_use]
    pub fn hidden_field(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            type_name: type_name.into(),
            tag: tag.into(),
            visible: false,
        });
        self
    }
}

/// One entry of a model definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    /// `"<field name>:<type name>"`.
    pub name: String,
    /// Tag metadata copied from the field.
    pub tag: String,
}

/// Bucket name plus field layout of an entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ModelDefinition {
    /// Bucket name; the entity's bare type name.
    pub table_name: String,
    /// Visible fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDefinition {
    /// Creates a definition directly.
    #[must_use]
    pub fn new(table_name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            table_name: table_name.into(),
            fields,
        }
    }

    /// A definition is usable only if it names a bucket.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.table_name.is_empty()
    }

    /// Returns the composite field names.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub(crate) fn ensure_valid(&self) -> CoreResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CoreError::invalid_model("model definition has no table name"))
        }
    }
}

/// Derives the model definition from an entity descriptor.
///
/// # Errors
///
/// `InvalidEntity` if the descriptor names no type or does not describe a
/// record.
pub fn inspect(schema: &EntitySchema) -> CoreResult<ModelDefinition> {
    if schema.type_name.trim().is_empty() {
        return Err(CoreError::invalid_entity("entity is absent"));
    }

    let table_name = bare_type_name(&schema.type_name);
    if schema.shape != Shape::Record {
        return Err(CoreError::invalid_entity(format!(
            "{table_name} is a {:?}, not a record",
            schema.shape
        )));
    }

    let fields = schema
        .fields
        .iter()
        .filter(|f| f.visible)
        .map(|f| FieldDescriptor {
            name: format!("{}:{}", f.name, f.type_name),
            tag: f.tag.clone(),
        })
        .collect();

    Ok(ModelDefinition {
        table_name: table_name.to_string(),
        fields,
    })
}

/// Model definition of `E`.
pub fn model_of<E: Entity>() -> CoreResult<ModelDefinition> {
    inspect(&E::schema())
}

/// Resolves a type name to its bare name: references and `Box`/`Rc`/`Arc`
/// wrappers are looked through, module paths and generic arguments are
/// dropped.
///
/// ```rust
/// use roomdb_core::model::bare_type_name;
///
/// assert_eq!(bare_type_name("&alloc::sync::Arc<app::v1::User>"), "User");
/// assert_eq!(bare_type_name("app::Page<app::User>"), "Page");
/// ```
#[must_use]
pub fn bare_type_name(type_name: &str) -> &str {
    let mut name = type_name.trim();
    loop {
        if let Some(rest) = name.strip_prefix('&') {
            let rest = rest.trim_start();
            name = rest.strip_prefix("mut ").unwrap_or(rest).trim_start();
            continue;
        }

        let (path, inner) = match name.find('<') {
            Some(open) => {
                let close = name
                    .rfind('>')
                    .filter(|close| *close > open)
                    .unwrap_or(name.len());
                (&name[..open], Some(&name[open + 1..close]))
            }
            None => (name, None),
        };
        let last = path.rsplit("::").next().unwrap_or(path).trim();

        match (last, inner) {
            ("Box" | "Rc" | "Arc", Some(inner)) => name = inner.trim(),
            _ => return last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Account {
        id: u64,
        owner: String,
        #[serde(skip)]
        cache: Option<String>,
    }

    impl Entity for Account {
        fn schema() -> EntitySchema {
            EntitySchema::record::<Self>()
                .typed_field::<u64>("ID", "")
                .typed_field::<String>("Owner", "indexed")
                .hidden_field("cache", "Option<String>", "")
        }

        fn id_mut(&mut self) -> Option<&mut u64> {
            Some(&mut self.id)
        }
    }

    #[test]
    fn record_fields_in_declaration_order() {
        let model = model_of::<Account>().unwrap();
        assert_eq!(model.table_name, "Account");
        assert_eq!(model.field_names(), vec!["ID:u64", "Owner:String"]);
        assert_eq!(model.fields[1].tag, "indexed");
        assert!(model.is_valid());
    }

    #[test]
    fn boxed_entity_resolves_to_inner_name() {
        assert_eq!(
            model_of::<Box<Account>>().unwrap(),
            model_of::<Account>().unwrap()
        );
        let schema = EntitySchema::record::<Box<Account>>();
        assert_eq!(inspect(&schema).unwrap().table_name, "Account");
    }

    #[test]
    fn boxed_entity_exposes_inner_id() {
        let mut boxed = Box::new(Account {
            id: 0,
            owner: "ana".into(),
            cache: None,
        });
        *Entity::id_mut(&mut boxed).unwrap() = 5;
        assert_eq!(boxed.id, 5);
    }

    #[test]
    fn absent_entity_is_rejected() {
        let schema = EntitySchema::named("", Shape::Record);
        assert!(matches!(
            inspect(&schema),
            Err(CoreError::InvalidEntity { .. })
        ));
    }

    #[test]
    fn non_records_are_rejected() {
        for shape in [Shape::Primitive, Shape::Collection] {
            let schema = EntitySchema::named("u32", shape);
            assert!(matches!(
                inspect(&schema),
                Err(CoreError::InvalidEntity { .. })
            ));
        }
    }

    #[test]
    fn record_without_fields_is_valid() {
        let model = inspect(&EntitySchema::named("app::Marker", Shape::Record)).unwrap();
        assert_eq!(model.table_name, "Marker");
        assert!(model.fields.is_empty());
    }

    #[test]
    fn empty_definition_is_invalid() {
        let model = ModelDefinition::default();
        assert!(!model.is_valid());
        assert!(matches!(
            model.ensure_valid(),
            Err(CoreError::InvalidModel { .. })
        ));
    }

    #[test]
    fn bare_names() {
        assert_eq!(bare_type_name("User"), "User");
        assert_eq!(bare_type_name("app::models::User"), "User");
        assert_eq!(bare_type_name("&mut app::User"), "User");
        assert_eq!(bare_type_name("& &app::User"), "User");
        assert_eq!(bare_type_name("alloc::boxed::Box<app::User>"), "User");
        assert_eq!(
            bare_type_name("alloc::rc::Rc<alloc::boxed::Box<app::User>>"),
            "User"
        );
        assert_eq!(
            bare_type_name("std::collections::HashMap<String, app::User>"),
            "HashMap"
        );
    }
}
