use chrono::{Duration, Utc};
use pagewatch_core::models::{
    CheckInterval, FetchConfig, NotifyChannels, RenderMode, Target, TargetPatch,
};
use pagewatch_core::traits::Storage;

use crate::common::setup_test_db;

#[tokio::test]
async fn create_and_get_round_trips_all_fields() {
    let (db, _container) = setup_test_db().await;
    db.health_check().await.unwrap();

    let mut target = Target::new("https://acme.test/pricing", "Pricing")
        .with_interval(CheckInterval::FifteenMinutes)
        .with_selector("#plans");
    target.render_mode = RenderMode::Browser;
    target.wait_for_selector = Some(".loaded".into());
    target.proxy = Some("http://proxy.local:8080".into());
    target.ignore_noise = true;
    target.fetch_config = Some(FetchConfig {
        cookies: Some("session=1".into()),
        timeout_ms: Some(5_000),
        ..Default::default()
    });
    target.notify = NotifyChannels {
        webhook: Some("https://hooks.test/x".into()),
        ..Default::default()
    };

    db.create_target(&target).await.unwrap();
    let stored = db.get_target(target.id).await.unwrap().expect("target exists");

    assert_eq!(stored.url, target.url);
    assert_eq!(stored.check_interval, CheckInterval::FifteenMinutes);
    assert_eq!(stored.render_mode, RenderMode::Browser);
    assert_eq!(stored.selector.as_deref(), Some("#plans"));
    assert_eq!(stored.fetch_config, target.fetch_config);
    assert_eq!(stored.notify, target.notify);
    assert!(stored.ignore_noise);
}

#[tokio::test]
async fn list_is_ordered_by_creation() {
    let (db, _container) = setup_test_db().await;

    let mut older = Target::new("https://a.test", "A");
    older.created_at = Utc::now() - Duration::hours(1);
    let newer = Target::new("https://b.test", "B");

    db.create_target(&newer).await.unwrap();
    db.create_target(&older).await.unwrap();

    let names: Vec<_> = db
        .list_targets()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["A", "B"]);
}

#[tokio::test]
async fn patch_only_touches_given_fields() {
    let (db, _container) = setup_test_db().await;
    let target = Target::new("https://acme.test", "Acme");
    db.create_target(&target).await.unwrap();

    let checked = Utc::now();
    let updated = db
        .update_target(target.id, &TargetPatch::checked_at(checked))
        .await
        .unwrap()
        .expect("target exists");

    assert_eq!(updated.name, "Acme");
    assert!(updated.enabled);
    assert!(updated.last_checked_at.is_some());
    assert!(updated.last_changed_at.is_none());

    let disabled = TargetPatch {
        enabled: Some(false),
        ..Default::default()
    };
    let updated = db.update_target(target.id, &disabled).await.unwrap().unwrap();
    assert!(!updated.enabled);
    assert!(updated.last_checked_at.is_some());
}

#[tokio::test]
async fn update_and_delete_missing_target() {
    let (db, _container) = setup_test_db().await;
    let id = uuid::Uuid::new_v4();

    assert!(
        db.update_target(id, &TargetPatch::checked_at(Utc::now()))
            .await
            .unwrap()
            .is_none()
    );
    assert!(!db.delete_target(id).await.unwrap());
}

#[tokio::test]
async fn duplicate_create_is_storage_error() {
    let (db, _container) = setup_test_db().await;
    let target = Target::new("https://acme.test", "Acme");
    db.create_target(&target).await.unwrap();

    let err = db.create_target(&target).await.unwrap_err();
    assert!(matches!(err, pagewatch_core::AppError::StorageError(_)));
}
