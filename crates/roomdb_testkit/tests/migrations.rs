//! Versioned initialization and migration of the sample `User` schema.

use proptest::prelude::*;
use roomdb_core::{
    identity_hash, CoreError, FnMigration, MigrationRegistry, ModelDefinition, Room, VersionNumber,
};
use roomdb_testkit::fixtures::users::{self, v1, v3, DEFAULT_SCORE};
use roomdb_testkit::prelude::*;

fn seed_v1(store: &TestStore, names: &[&str]) -> Vec<v1::User> {
    let room = users_room(store, 1);
    assert!(matches!(
        room.initialize(InitOptions::default()).unwrap(),
        InitOutcome::Created { .. }
    ));
    names
        .iter()
        .map(|name| {
            let mut user = v1::User::new(*name);
            store.create(&mut user).unwrap();
            user
        })
        .collect()
}

#[test]
fn metadata_missing_before_initialization() {
    let store = TestStore::memory();
    assert!(matches!(
        store.latest_identity_and_version(),
        Err(CoreError::NoSuchTable { .. })
    ));
}

#[test]
fn fresh_initialization_records_version() {
    init_test_logging();
    let store = TestStore::memory();
    let room = users_room(&store, 1);

    let outcome = room.initialize(InitOptions::default()).unwrap();
    assert_eq!(outcome.version(), VersionNumber::new(1));

    let (hash, version) = store.latest_identity_and_version().unwrap();
    assert_eq!(hash, identity_hash(&users::models(1)));
    assert_eq!(version, VersionNumber::new(1));
    assert!(store.has_table::<v1::User>().unwrap());

    let again = room.initialize(InitOptions::default()).unwrap();
    assert!(matches!(again, InitOutcome::UpToDate { .. }));
    assert_eq!(store.history().unwrap().len(), 1);
}

#[test]
fn migrates_one_to_three() {
    init_test_logging();
    let store = TestStore::memory();
    let before = seed_v1(&store, &["ana", "bo", "cy"]);

    let room = users_room(&store, 3);
    let outcome = room.initialize(InitOptions::default()).unwrap();
    assert_eq!(
        outcome,
        InitOutcome::Migrated {
            from: VersionNumber::new(1),
            to: VersionNumber::new(3),
            applied: vec!["rename Name to username".into(), "add Score".into()],
        }
    );

    let after = store.scan::<v3::User>().unwrap();
    assert_eq!(after.len(), before.len());
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(new.id, old.id);
        assert_eq!(new.name, old.name);
        assert_eq!(new.score, DEFAULT_SCORE);
    }

    let (hash, version) = store.latest_identity_and_version().unwrap();
    assert_eq!(version, VersionNumber::new(3));
    assert_eq!(hash, room.identity_hash());

    let versions: Vec<u32> = store
        .history()
        .unwrap()
        .iter()
        .map(|record| record.version.as_u32())
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[test]
fn ids_continue_after_migration() {
    let store = TestStore::memory();
    seed_v1(&store, &["ana", "bo"]);
    users_room(&store, 3)
        .initialize(InitOptions::default())
        .unwrap();

    let mut newcomer = v3::User::new("dee", 42);
    store.create(&mut newcomer).unwrap();
    assert_eq!(newcomer.id, 3);
}

#[test]
fn migration_survives_reopen() {
    let store = TestStore::file();
    seed_v1(&store, &["ana"]);
    users_room(&store, 2)
        .initialize(InitOptions::default())
        .unwrap();

    let store = store.reopen();
    let room = users_room(&store, 3);
    let outcome = room.initialize(InitOptions::default()).unwrap();
    assert!(matches!(outcome, InitOutcome::Migrated { ref applied, .. } if applied.len() == 1));
    drop(room);

    let store = store.reopen();
    let users = store.scan::<v3::User>().unwrap();
    assert_eq!(users, vec![v3::User { id: 1, name: "ana".into(), score: DEFAULT_SCORE }]);
    assert_eq!(
        store.latest_identity_and_version().unwrap().1,
        VersionNumber::new(3)
    );
}

#[test]
fn failing_step_keeps_earlier_steps() {
    let store = TestStore::memory();
    seed_v1(&store, &["ana"]);

    let registry = MigrationRegistry::new()
        .with(FnMigration::new(1, 2, |_| Ok(())))
        .and_then(|r| {
            r.with(FnMigration::new(2, 3, |_| {
                Err(CoreError::invalid_operation("boom"))
            }))
        })
        .unwrap();
    let room = Room::new(users::models(3), store.adapter.clone(), 3, registry).unwrap();

    let err = room.initialize(InitOptions::default()).unwrap_err();
    assert!(matches!(err, CoreError::MigrationStepFailed { .. }));
    assert_eq!(
        store.latest_identity_and_version().unwrap().1,
        VersionNumber::new(2)
    );
    assert_eq!(store.count::<v1::User>().unwrap(), 1);
}

#[test]
fn intermediate_version_opens_for_its_own_app() {
    let store = TestStore::memory();
    seed_v1(&store, &["ana"]);

    let registry = MigrationRegistry::new()
        .with(FnMigration::new(1, 2, |_| Ok(())))
        .and_then(|r| {
            r.with(FnMigration::new(2, 3, |_| {
                Err(CoreError::invalid_operation("boom"))
            }))
        })
        .unwrap();
    let v3 = Room::new(users::models(3), store.adapter.clone(), 3, registry).unwrap();
    assert!(v3.initialize(InitOptions::default()).is_err());
    assert_eq!(
        store.latest_identity_and_version().unwrap(),
        (String::new(), VersionNumber::new(2))
    );

    // Even with the destructive fallback allowed, the v2 app keeps the data.
    let v2 = users_room(&store, 2);
    let options = InitOptions::new().fallback_to_destructive_migration(true);
    let outcome = v2.initialize(options).unwrap();
    assert_eq!(
        outcome,
        InitOutcome::UpToDate {
            version: VersionNumber::new(2)
        }
    );
    assert_eq!(store.count::<v1::User>().unwrap(), 1);
    assert_eq!(
        store.latest_identity_and_version().unwrap(),
        (v2.identity_hash().to_string(), VersionNumber::new(2))
    );

    // The identity is now recorded; a second start writes nothing.
    v2.initialize(InitOptions::default()).unwrap();
    assert_eq!(store.history().unwrap().len(), 3);
}

#[test]
fn gap_without_fallback_is_an_error() {
    let store = TestStore::memory();
    seed_v1(&store, &["ana"]);

    let room = Room::new(
        users::models(3),
        store.adapter.clone(),
        3,
        MigrationRegistry::new(),
    )
    .unwrap();
    let err = room.initialize(InitOptions::default()).unwrap_err();
    assert!(matches!(err, CoreError::MigrationGap { .. }));
    assert_eq!(store.count::<v1::User>().unwrap(), 1);
}

#[test]
fn gap_with_fallback_resets() {
    let store = TestStore::memory();
    seed_v1(&store, &["ana", "bo"]);

    let room = Room::new(
        users::models(3),
        store.adapter.clone(),
        3,
        MigrationRegistry::new(),
    )
    .unwrap();
    let options = InitOptions::new().fallback_to_destructive_migration(true);
    let outcome = room.initialize(options).unwrap();

    assert!(matches!(outcome, InitOutcome::DestructiveReset { from, to, .. }
        if from == VersionNumber::new(1) && to == VersionNumber::new(3)));
    assert_eq!(store.count::<v3::User>().unwrap(), 0);
    assert_eq!(
        store.latest_identity_and_version().unwrap(),
        (room.identity_hash().to_string(), VersionNumber::new(3))
    );
}

#[test]
fn downgrade_is_refused() {
    let store = TestStore::memory();
    seed_v1(&store, &[]);
    users_room(&store, 3)
        .initialize(InitOptions::default())
        .unwrap();

    let err = users_room(&store, 2)
        .initialize(InitOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::VersionDowngrade { .. }));
    assert!(err.is_schema_conflict());
}

#[test]
fn changed_models_without_version_bump_conflict() {
    let store = TestStore::memory();
    seed_v1(&store, &[]);

    let room = Room::new(
        users::models(3),
        store.adapter.clone(),
        1,
        MigrationRegistry::new(),
    )
    .unwrap();
    let err = room.initialize(InitOptions::default()).unwrap_err();
    assert!(matches!(err, CoreError::IdentityMismatch { .. }));
}

fn marker_registry(doc: &ModelDefinition, chain: &[(u32, u32)]) -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    for &(base, target) in chain {
        let doc = doc.clone();
        registry
            .register(Box::new(FnMigration::new(base, target, move |tx| {
                tx.transform_records(&doc, |_, mut value| {
                    value[format!("v{target}")] = target.into();
                    Ok(value)
                })?;
                Ok(())
            })))
            .unwrap();
    }
    registry
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn generated_chains_replay_in_order(
        chain in migration_chain_strategy(6),
        records in prop::collection::vec(json_record_strategy(), 0..8),
    ) {
        let store = TestStore::memory();
        let doc = ModelDefinition::new("Doc", vec![]);
        Room::new(vec![doc.clone()], store.adapter.clone(), 1, MigrationRegistry::new())
            .unwrap()
            .initialize(InitOptions::default())
            .unwrap();
        store
            .do_in_transaction(|tx| {
                for (i, record) in records.iter().enumerate() {
                    tx.put_raw(&doc, i as u64 + 1, &serde_json::to_vec(record)?)?;
                }
                Ok(())
            })
            .unwrap();

        let target = chain.last().map(|&(_, t)| t).unwrap();
        let registry = marker_registry(&doc, &chain);
        let planned = registry
            .plan(VersionNumber::new(1), VersionNumber::new(target))
            .unwrap()
            .len();
        prop_assert_eq!(planned, chain.len());

        let room = Room::new(vec![doc.clone()], store.adapter.clone(), target, registry).unwrap();
        let outcome = room.initialize(InitOptions::default()).unwrap();
        let migrated_all = matches!(outcome, InitOutcome::Migrated { ref applied, .. } if applied.len() == chain.len());
        prop_assert!(migrated_all);

        let stored = store.do_in_transaction(|tx| tx.raw_records(&doc)).unwrap();
        prop_assert_eq!(stored.len(), records.len());
        for ((id, bytes), original) in stored.iter().zip(&records) {
            let value: serde_json::Value = serde_json::from_slice(bytes).unwrap();
            let mut expected = original.clone();
            for &(_, step) in &chain {
                expected[format!("v{step}")] = step.into();
            }
            prop_assert_eq!(&value, &expected, "record {}", id);
        }
    }
}
