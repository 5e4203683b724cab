//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for generating valid bucket names.
pub fn bucket_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9_]{0,23}").expect("Invalid regex")
}

/// Strategy for generating user display names.
pub fn user_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9 ]{0,15}").expect("Invalid regex")
}

/// Strategy for generating batches of user names.
pub fn user_batch_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(user_name_strategy(), 0..max)
}

/// Strategy for generating flat JSON records.
pub fn json_record_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[ -~]{0,16}".prop_map(Value::from),
        ],
        0..6,
    )
    .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>()))
}

/// Strategy for generating a create/fail/delete workload.
///
/// `true` creates a record, `false` attempts one that fails and rolls back.
pub fn create_outcomes_strategy(max: usize) -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..max)
}

/// Strategy for generating contiguous migration chains as `(base, target)`
/// pairs starting at version 1.
pub fn migration_chain_strategy(max_steps: usize) -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec(1u32..4, 1..max_steps).prop_map(|jumps| {
        let mut base = 1;
        jumps
            .into_iter()
            .map(|jump| {
                let step = (base, base + jump);
                base += jump;
                step
            })
            .collect()
    })
}
