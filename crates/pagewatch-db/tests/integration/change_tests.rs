use chrono::{Duration, Utc};
use pagewatch_core::models::{
    ChangeRecord, ChangeType, DiffLine, DiffLineKind, FetchedPage, Importance, Snapshot, Target,
};
use pagewatch_core::traits::Storage;
use uuid::Uuid;

use crate::common::setup_test_db;

fn page(content: &str) -> FetchedPage {
    FetchedPage {
        content: content.to_string(),
        title: "Pricing".to_string(),
        status_code: 200,
        response_time_ms: 42,
    }
}

fn change(target_id: Uuid, previous: &Snapshot, current: &Snapshot, importance: Importance) -> ChangeRecord {
    ChangeRecord {
        id: Uuid::new_v4(),
        target_id,
        previous_snapshot_id: previous.id,
        current_snapshot_id: current.id,
        detected_at: current.captured_at,
        change_type: ChangeType::Content,
        summary: "Detected changes on Pricing: 30 words added, 0 words removed.".into(),
        diff: vec![
            DiffLine {
                kind: DiffLineKind::Removed,
                text: "Price: $10".into(),
            },
            DiffLine {
                kind: DiffLineKind::Added,
                text: "Price: $15".into(),
            },
        ],
        importance,
        notified: false,
    }
}

#[tokio::test]
async fn latest_snapshot_wins() {
    let (db, _container) = setup_test_db().await;
    let target = Target::new("https://acme.test", "Acme");
    db.create_target(&target).await.unwrap();

    assert!(db.get_latest_snapshot(target.id).await.unwrap().is_none());

    let mut first = Snapshot::capture(target.id, page("Price: $10"));
    first.captured_at = Utc::now() - Duration::minutes(5);
    let second = Snapshot::capture(target.id, page("Price: $15"));
    db.save_snapshot(&first).await.unwrap();
    db.save_snapshot(&second).await.unwrap();

    let latest = db.get_latest_snapshot(target.id).await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);
    assert_eq!(latest.content_hash, second.content_hash);
    assert_eq!(latest.metadata.status_code, 200);
    assert_eq!(latest.metadata.title.as_deref(), Some("Pricing"));

    let history = db.snapshots().history(target.id, 10).await.unwrap();
    assert_eq!(history.len(), 2);

    assert!(db.delete_snapshot(second.id).await.unwrap());
    assert!(!db.delete_snapshot(second.id).await.unwrap());
    let latest = db.get_latest_snapshot(target.id).await.unwrap().unwrap();
    assert_eq!(latest.id, first.id);
}

#[tokio::test]
async fn change_records_round_trip_and_mark_notified() {
    let (db, _container) = setup_test_db().await;
    let target = Target::new("https://acme.test", "Acme");
    db.create_target(&target).await.unwrap();

    let previous = Snapshot::capture(target.id, page("Price: $10"));
    let current = Snapshot::capture(target.id, page("Price: $15"));
    db.save_snapshot(&previous).await.unwrap();
    db.save_snapshot(&current).await.unwrap();

    let record = change(target.id, &previous, &current, Importance::High);
    db.save_change(&record).await.unwrap();
    db.mark_change_notified(record.id).await.unwrap();

    let changes = db.list_changes(Some(target.id), 10).await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].importance, Importance::High);
    assert_eq!(changes[0].diff, record.diff);
    assert!(changes[0].notified);
}

#[tokio::test]
async fn list_changes_filters_and_limits() {
    let (db, _container) = setup_test_db().await;
    let a = Target::new("https://a.test", "A");
    let b = Target::new("https://b.test", "B");
    db.create_target(&a).await.unwrap();
    db.create_target(&b).await.unwrap();

    for target in [&a, &a, &b] {
        let previous = Snapshot::capture(target.id, page("one"));
        let current = Snapshot::capture(target.id, page("two"));
        db.save_snapshot(&previous).await.unwrap();
        db.save_snapshot(&current).await.unwrap();
        db.save_change(&change(target.id, &previous, &current, Importance::Low))
            .await
            .unwrap();
    }

    assert_eq!(db.list_changes(Some(a.id), 10).await.unwrap().len(), 2);
    assert_eq!(db.list_changes(None, 10).await.unwrap().len(), 3);
    assert_eq!(db.list_changes(None, 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn mark_missing_change_fails() {
    let (db, _container) = setup_test_db().await;
    let err = db.mark_change_notified(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, pagewatch_core::AppError::StorageError(_)));
}

#[tokio::test]
async fn deleting_target_cascades() {
    let (db, _container) = setup_test_db().await;
    let target = Target::new("https://acme.test", "Acme");
    db.create_target(&target).await.unwrap();
    db.save_snapshot(&Snapshot::capture(target.id, page("x")))
        .await
        .unwrap();

    assert!(db.delete_target(target.id).await.unwrap());
    assert!(db.get_latest_snapshot(target.id).await.unwrap().is_none());
}
