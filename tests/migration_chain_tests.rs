mod common;

use common::*;
use tabletop_store::migration::MigrationServices;
use tabletop_store::model::{MapRecord, MapSessionState, Outline};
use tabletop_store::{LATEST_VERSION, STABLE_VERSION, StoreError, Value, open_store};
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn upgrade_to_current_version_leaves_snapshot_bytes_identical() {
    let dir = tempdir().unwrap();
    let mut store = upgraded_store(dir.path(), 12, sample_seed).await;
    let before = store.persistence().load_bytes().await.unwrap().unwrap();

    let report = assert_ok!(migrator(services()).upgrade(&mut store, 12, 12).await);
    assert!(report.is_noop());

    let after = store.persistence().load_bytes().await.unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(store.schema_version(), 12);
}

#[tokio::test]
async fn one_shot_upgrade_matches_step_by_step_upgrade() {
    let one_shot_dir = tempdir().unwrap();
    let stepwise_dir = tempdir().unwrap();

    let mut one_shot = seeded_store(one_shot_dir.path(), sample_seed).await;
    assert_ok!(
        migrator(services())
            .upgrade(&mut one_shot, 1, LATEST_VERSION)
            .await
    );

    let mut stepwise = seeded_store(stepwise_dir.path(), sample_seed).await;
    let migrator = migrator(services());
    for version in 2..=LATEST_VERSION {
        let report = assert_ok!(migrator.upgrade(&mut stepwise, version - 1, version).await);
        assert_eq!(report.steps.len(), 1);
    }

    assert_eq!(one_shot.schema_version(), stepwise.schema_version());
    assert_eq!(one_shot.snapshot().tables, stepwise.snapshot().tables);
}

#[tokio::test]
async fn upgrade_reports_every_applied_step_in_order() {
    let store_dir = tempdir().unwrap();
    let mut store = seeded_store(store_dir.path(), sample_seed).await;

    let report = assert_ok!(migrator(services()).upgrade_to(&mut store, STABLE_VERSION).await);
    let versions: Vec<u32> = report.steps.iter().map(|step| step.version).collect();
    assert_eq!(versions, (2..=STABLE_VERSION).collect::<Vec<_>>());
    assert_eq!(report.from, 1);
    assert_eq!(report.to, STABLE_VERSION);
    assert_eq!(store.schema_version(), STABLE_VERSION);
}

#[tokio::test]
async fn out_of_order_and_unknown_targets_are_rejected() {
    let mut store = seeded_memory_store(sample_seed).await;
    let migrator = migrator(services());

    let err = assert_err!(migrator.upgrade(&mut store, 0, 5).await);
    assert!(matches!(err, StoreError::OrderingViolation { from: 0, .. }));

    let err = assert_err!(migrator.upgrade(&mut store, 1, 0).await);
    assert!(matches!(err, StoreError::OrderingViolation { to: 0, .. }));

    let err = assert_err!(migrator.upgrade(&mut store, 1, LATEST_VERSION + 1).await);
    assert!(matches!(
        err,
        StoreError::UnknownVersion { requested, latest } if requested == LATEST_VERSION + 1 && latest == LATEST_VERSION
    ));

    assert_eq!(store.schema_version(), 1);
}

#[tokio::test]
async fn failed_step_leaves_last_committed_version_on_disk() {
    let dir = tempdir().unwrap();
    let mut store = seeded_store(dir.path(), |tx| {
        insert(
            tx,
            "maps",
            vec![legacy_map("broken", LOCAL_USER, Value::Integer(7), 10, 10)],
        )
    })
    .await;

    let err = assert_err!(migrator(services()).upgrade(&mut store, 1, 10).await);
    assert!(matches!(err, StoreError::StepTransformFailure { version: 2, .. }));
    assert_eq!(store.schema_version(), 1);
    drop(store);

    let reopened = assert_ok!(open_store(options(dir.path()).target_version(1)).await);
    assert_eq!(reopened.schema_version(), 1);
    let map = reopened.table("maps").unwrap().get("broken").cloned().unwrap();
    assert_eq!(map.get("file"), Some(&Value::Integer(7)));
}

#[tokio::test]
async fn embedded_map_image_becomes_a_single_asset() {
    let mut store = seeded_memory_store(|tx| {
        insert(
            tx,
            "maps",
            vec![legacy_map("m1", LOCAL_USER, Value::Bytes(png(100, 100)), 100, 100)],
        )
    })
    .await;

    assert_ok!(
        migrator(MigrationServices::without_media())
            .upgrade(&mut store, 1, LATEST_VERSION)
            .await
    );

    let assets = store.table("assets").unwrap().records();
    assert_eq!(assets.len(), 1);
    let asset = assets[0];
    assert_eq!(asset.get_i64("width"), Some(100));
    assert_eq!(asset.get_i64("height"), Some(100));

    let map = MapRecord::from_record(store.table("maps").unwrap().get("m1").unwrap()).unwrap();
    assert_eq!(Some(map.file.as_str()), asset.get_str("id"));
    assert_eq!(map.thumbnail, None);
    assert!(map.resolutions.is_empty());
}

#[tokio::test]
async fn entries_of_deleted_templates_get_fallback_values() {
    let mut store = seeded_memory_store(sample_seed).await;
    let migrator = migrator(services());
    assert_ok!(migrator.upgrade(&mut store, 1, 28).await);

    store
        .write(|tx| {
            tx.table_mut("tokens")?.delete("t1");
            Ok(())
        })
        .await
        .unwrap();
    assert_ok!(migrator.upgrade(&mut store, 28, 29).await);

    let state = store.table("states").unwrap().get("m1").cloned().unwrap();
    let state = MapSessionState::from_record(&state).unwrap();
    let orphan = &state.tokens["e1"];
    assert_eq!(orphan.category, "character");
    assert_eq!(orphan.kind, "file");
    assert_eq!(orphan.outline, Some(Outline::Rect));
    assert_eq!(orphan.width, Some(256.0));
    assert_eq!(orphan.height, Some(256.0));

    let default = &state.tokens["e2"];
    assert_eq!(default.token_id, "__default-Barbarian");
    assert_eq!(default.key.as_deref(), Some("barbarian"));
}

#[tokio::test]
async fn default_open_stops_at_stable_version() {
    let dir = tempdir().unwrap();
    drop(seeded_store(dir.path(), sample_seed).await);

    let store = assert_ok!(open_store(options(dir.path())).await);
    assert_eq!(store.schema_version(), STABLE_VERSION);
    // Ownership collection only runs on the latest target.
    assert!(store.table("tokens").unwrap().get("t2").is_some());
}
