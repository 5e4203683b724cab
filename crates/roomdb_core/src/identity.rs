//! Identity hash of a set of entity models.

use crate::model::ModelDefinition;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Computes the identity hash of `models`: lowercase hex SHA-256 over the
/// models sorted by table name, each rendered as `Table{Field:Type,...}` and
/// joined with `;`.
///
/// Registration order does not matter; field order does.
#[must_use]
pub fn identity_hash(models: &[ModelDefinition]) -> String {
    let mut sorted: Vec<&ModelDefinition> = models.iter().collect();
    sorted.sort_by(|a, b| a.table_name.cmp(&b.table_name));

    let canonical = sorted
        .iter()
        .map(|m| format!("{}{{{}}}", m.table_name, m.field_names().join(",")))
        .collect::<Vec<_>>()
        .join(";");

    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldDescriptor;

    fn model(table: &str, fields: &[&str]) -> ModelDefinition {
        ModelDefinition::new(
            table,
            fields
                .iter()
                .map(|name| FieldDescriptor {
                    name: (*name).to_string(),
                    tag: String::new(),
                })
                .collect(),
        )
    }

    #[test]
    fn known_digest() {
        // sha256("User{ID:u64,Name:String}")
        let hash = identity_hash(&[model("User", &["ID:u64", "Name:String"])]);
        assert_eq!(
            hash,
            "cb1e79deda7a19e988b77946b2f1ea2265355fb36113509b4976ebc6c712d125"
        );
    }

    #[test]
    fn registration_order_is_irrelevant() {
        let a = model("Account", &["ID:u64"]);
        let u = model("User", &["ID:u64"]);
        assert_eq!(
            identity_hash(&[a.clone(), u.clone()]),
            identity_hash(&[u, a])
        );
    }

    #[test]
    fn field_changes_change_hash() {
        let v1 = model("User", &["ID:u64", "Name:String"]);
        let v3 = model("User", &["ID:u64", "Name:String", "Score:i64"]);
        let retyped = model("User", &["ID:u64", "Name:u32"]);
        assert_ne!(identity_hash(&[v1.clone()]), identity_hash(&[v3]));
        assert_ne!(identity_hash(&[v1]), identity_hash(&[retyped]));
    }

    #[test]
    fn tags_do_not_affect_hash() {
        let plain = model("User", &["ID:u64"]);
        let mut tagged = plain.clone();
        tagged.fields[0].tag = "primary".into();
        assert_eq!(identity_hash(&[plain]), identity_hash(&[tagged]));
    }
}
