//! Bucket store behavior through the adapter.

use proptest::prelude::*;
use roomdb_core::{model_of, CoreError, ModelDefinition};
use roomdb_testkit::fixtures::users::{self, v1::User};
use roomdb_testkit::prelude::*;

fn store_with_users() -> TestStore {
    let store = TestStore::memory();
    store.create_table(&users::models(1)).unwrap();
    store
}

#[test]
fn has_table_follows_create_and_drop() {
    init_test_logging();
    let store = TestStore::memory();
    assert!(!store.has_table::<User>().unwrap());

    store.create_table(&users::models(1)).unwrap();
    assert!(store.has_table::<User>().unwrap());

    store.drop_table(&users::models(1)).unwrap();
    assert!(!store.has_table::<User>().unwrap());
}

#[test]
fn create_table_twice_fails_atomically() {
    let store = store_with_users();
    let account = ModelDefinition::new("Account", vec![]);
    let result = store.create_table(&[account.clone(), model_of::<User>().unwrap()]);

    assert!(matches!(result, Err(CoreError::BucketCreateFailed { ref name, .. }) if name == "User"));
    assert!(!store.has_bucket(&account).unwrap());
}

#[test]
fn drop_missing_table_fails_atomically() {
    let store = store_with_users();
    let ghost = ModelDefinition::new("Ghost", vec![]);
    let result = store.drop_table(&[model_of::<User>().unwrap(), ghost]);

    assert!(matches!(result, Err(CoreError::BucketDeleteFailed { ref name, .. }) if name == "Ghost"));
    assert!(store.has_table::<User>().unwrap());
}

#[test]
fn invalid_model_is_rejected() {
    let store = TestStore::memory();
    let unnamed = ModelDefinition::new("", vec![]);
    assert!(matches!(
        store.create_table(&[unnamed]),
        Err(CoreError::InvalidModel { .. })
    ));
}

#[test]
fn create_requires_table() {
    let store = TestStore::memory();
    let mut user = User::new("ana");
    assert!(matches!(
        store.create(&mut user),
        Err(CoreError::NoSuchTable { ref name }) if name == "User"
    ));
    assert_eq!(user.id, 0);
}

#[test]
fn create_assigns_id_and_round_trips() {
    let store = store_with_users();
    let mut ana = User::new("ana");
    let mut bo = User::new("bo");

    assert_eq!(store.create(&mut ana).unwrap(), 1);
    assert_eq!(store.create(&mut bo).unwrap(), 2);
    assert_eq!(ana.id, 1);
    assert_eq!(bo.id, 2);

    assert_eq!(store.get::<User>(2).unwrap(), Some(bo.clone()));
    assert_eq!(store.get::<User>(3).unwrap(), None);
    assert_eq!(store.scan::<User>().unwrap(), vec![ana, bo]);
}

#[test]
fn stored_layout_uses_big_endian_keys_and_json() {
    let store = store_with_users();
    let mut user = User::new("ana");
    store.create(&mut user).unwrap();

    let raw = store
        .underlying_store()
        .view(|txn| Ok(txn.get("User", &roomdb_core::encode_key(1))?.map(<[u8]>::to_vec)))
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(value, serde_json::json!({"ID": 1, "Name": "ana"}));
}

#[test]
fn truncate_keeps_bucket_and_sequence() {
    let store = store_with_users();
    for name in ["a", "b", "c"] {
        store.create(&mut User::new(name)).unwrap();
    }

    assert_eq!(store.truncate_table::<User>().unwrap(), 3);
    assert!(store.has_table::<User>().unwrap());
    assert_eq!(store.count::<User>().unwrap(), 0);

    let mut next = User::new("d");
    store.create(&mut next).unwrap();
    assert_eq!(next.id, 4);
}

#[test]
fn truncate_missing_table_fails() {
    let store = TestStore::memory();
    assert!(matches!(
        store.truncate_table::<User>(),
        Err(CoreError::NoSuchTable { .. })
    ));
}

#[test]
fn transaction_commits_together() {
    let store = store_with_users();
    let ids = store
        .do_in_transaction(|tx| {
            let first = tx.create(&mut User::new("ana"))?;
            let second = tx.create(&mut User::new("bo"))?;
            assert_eq!(tx.count::<User>()?, 2);
            Ok((first, second))
        })
        .unwrap();

    assert_eq!(ids, (1, 2));
    assert_eq!(store.count::<User>().unwrap(), 2);
}

#[test]
fn transaction_error_rolls_back_everything() {
    let store = TestStore::memory();
    let result: Result<(), CoreError> = store.do_in_transaction(|tx| {
        tx.create_table(&users::models(1))?;
        tx.create(&mut User::new("ana"))?;
        Err(CoreError::invalid_operation("abort"))
    });

    assert!(result.is_err());
    assert!(!store.has_table::<User>().unwrap());
}

#[test]
fn adapter_inside_transaction_fails_fast() {
    let store = store_with_users();
    let adapter = store.adapter.clone();
    let result = store.do_in_transaction(|_| adapter.count::<User>());
    assert!(matches!(result, Err(CoreError::NestedTransaction)));
}

#[test]
fn failed_transactions_never_reuse_ids() {
    let store = store_with_users();
    let first = store.create(&mut User::new("ana")).unwrap();

    let failed: Result<u64, CoreError> = store.do_in_transaction(|tx| {
        tx.create(&mut User::new("lost"))?;
        Err(CoreError::invalid_operation("abort"))
    });
    assert!(failed.is_err());

    let third = store.create(&mut User::new("bo")).unwrap();
    assert_eq!((first, third), (1, 3));
    assert_eq!(store.count::<User>().unwrap(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ids_strictly_increase(outcomes in create_outcomes_strategy(24)) {
        let store = store_with_users();
        let mut last = 0;
        let mut kept = 0;

        for commit in outcomes {
            let result = store.do_in_transaction(|tx| {
                let id = tx.create(&mut User::new("x"))?;
                if commit {
                    Ok(id)
                } else {
                    Err(CoreError::invalid_operation("abort"))
                }
            });
            if let Ok(id) = result {
                prop_assert!(id > last);
                last = id;
                kept += 1;
            }
        }

        prop_assert_eq!(store.count::<User>().unwrap(), kept);
    }

    #[test]
    fn scan_returns_creation_order(names in user_batch_strategy(16)) {
        let store = store_with_users();
        for name in &names {
            store.create(&mut User::new(name.clone())).unwrap();
        }
        let stored: Vec<String> = store.scan::<User>().unwrap().into_iter().map(|u| u.name).collect();
        prop_assert_eq!(stored, names);
    }

    #[test]
    fn generated_bucket_names_create_and_drop(name in bucket_name_strategy()) {
        let store = TestStore::memory();
        let model = ModelDefinition::new(name, vec![]);

        store.create_table(&[model.clone()]).unwrap();
        prop_assert!(store.has_bucket(&model).unwrap());
        let is_create_failed = matches!(
            store.create_table(&[model.clone()]),
            Err(CoreError::BucketCreateFailed { .. })
        );
        prop_assert!(is_create_failed);

        store.drop_table(&[model.clone()]).unwrap();
        prop_assert!(!store.has_bucket(&model).unwrap());
    }
}
