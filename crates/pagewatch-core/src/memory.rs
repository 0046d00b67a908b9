//! In-process [`Storage`] implementation.
//!
//! Backs the test suites and `pagewatch run --memory`. Nothing survives a
//! restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ChangeRecord, Snapshot, Target, TargetPatch};
use crate::traits::Storage;

#[derive(Debug, Default)]
struct MemoryState {
    targets: HashMap<Uuid, Target>,
    /// Per target, in capture order.
    snapshots: HashMap<Uuid, Vec<Snapshot>>,
    changes: Vec<ChangeRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        let storage = Self::default();
        {
            let mut state = storage.lock_state();
            for target in targets {
                state.targets.insert(target.id, target);
            }
        }
        storage
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned memory storage mutex");
            poisoned.into_inner()
        })
    }

    /// All snapshots of a target, oldest first.
    pub fn snapshots_for(&self, target_id: Uuid) -> Vec<Snapshot> {
        self.lock_state()
            .snapshots
            .get(&target_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn change_count(&self) -> usize {
        self.lock_state().changes.len()
    }
}

impl Storage for MemoryStorage {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn list_targets(&self) -> Result<Vec<Target>, AppError> {
        let mut targets: Vec<Target> = self.lock_state().targets.values().cloned().collect();
        targets.sort_by_key(|t| t.created_at);
        Ok(targets)
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, AppError> {
        Ok(self.lock_state().targets.get(&id).cloned())
    }

    async fn create_target(&self, target: &Target) -> Result<(), AppError> {
        let mut state = self.lock_state();
        if state.targets.contains_key(&target.id) {
            return Err(AppError::StorageError(format!(
                "Target {} already exists",
                target.id
            )));
        }
        state.targets.insert(target.id, target.clone());
        Ok(())
    }

    async fn update_target(&self, id: Uuid, patch: &TargetPatch) -> Result<Option<Target>, AppError> {
        let mut state = self.lock_state();
        Ok(state.targets.get_mut(&id).map(|target| {
            patch.apply(target);
            target.clone()
        }))
    }

    async fn delete_target(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.lock_state();
        let existed = state.targets.remove(&id).is_some();
        state.snapshots.remove(&id);
        state.changes.retain(|c| c.target_id != id);
        Ok(existed)
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        self.lock_state()
            .snapshots
            .entry(snapshot.target_id)
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn delete_snapshot(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.lock_state();
        for snapshots in state.snapshots.values_mut() {
            if let Some(pos) = snapshots.iter().position(|s| s.id == id) {
                snapshots.remove(pos);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn get_latest_snapshot(&self, target_id: Uuid) -> Result<Option<Snapshot>, AppError> {
        Ok(self
            .lock_state()
            .snapshots
            .get(&target_id)
            .and_then(|s| s.iter().max_by_key(|s| s.captured_at))
            .cloned())
    }

    async fn save_change(&self, change: &ChangeRecord) -> Result<(), AppError> {
        self.lock_state().changes.push(change.clone());
        Ok(())
    }

    async fn mark_change_notified(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.lock_state();
        match state.changes.iter_mut().find(|c| c.id == id) {
            Some(change) => {
                change.notified = true;
                Ok(())
            }
            None => Err(AppError::StorageError(format!("Change {id} not found"))),
        }
    }

    async fn list_changes(
        &self,
        target_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>, AppError> {
        let state = self.lock_state();
        let mut changes: Vec<ChangeRecord> = state
            .changes
            .iter()
            .filter(|c| target_id.is_none_or(|id| c.target_id == id))
            .cloned()
            .collect();
        changes.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        changes.truncate(limit);
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::FetchedPage;
    use crate::testutil::sample_change;

    fn page(content: &str) -> FetchedPage {
        FetchedPage {
            content: content.to_string(),
            title: "Title".into(),
            status_code: 200,
            response_time_ms: 10,
        }
    }

    #[tokio::test]
    async fn latest_snapshot_is_most_recent() {
        let storage = MemoryStorage::new();
        let target_id = Uuid::new_v4();

        let first = Snapshot::capture(target_id, page("one"));
        let mut second = Snapshot::capture(target_id, page("two"));
        second.captured_at = first.captured_at + chrono::TimeDelta::seconds(1);
        storage.save_snapshot(&second).await.unwrap();
        storage.save_snapshot(&first).await.unwrap();

        let latest = storage.get_latest_snapshot(target_id).await.unwrap().unwrap();
        assert_eq!(latest.content, "two");
    }

    #[tokio::test]
    async fn deleted_snapshot_is_no_longer_latest() {
        let storage = MemoryStorage::new();
        let target_id = Uuid::new_v4();

        let first = Snapshot::capture(target_id, page("one"));
        let mut second = Snapshot::capture(target_id, page("two"));
        second.captured_at = first.captured_at + chrono::TimeDelta::seconds(1);
        storage.save_snapshot(&first).await.unwrap();
        storage.save_snapshot(&second).await.unwrap();

        assert!(storage.delete_snapshot(second.id).await.unwrap());
        assert!(!storage.delete_snapshot(second.id).await.unwrap());
        let latest = storage.get_latest_snapshot(target_id).await.unwrap().unwrap();
        assert_eq!(latest.id, first.id);
    }

    #[tokio::test]
    async fn update_missing_target_returns_none() {
        let storage = MemoryStorage::new();
        let result = storage
            .update_target(Uuid::new_v4(), &TargetPatch::checked_at(Utc::now()))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn duplicate_target_is_rejected() {
        let target = Target::new("https://example.com", "Example");
        let storage = MemoryStorage::with_targets([target.clone()]);
        let err = storage.create_target(&target).await.unwrap_err();
        assert!(matches!(err, AppError::StorageError(_)));
    }

    #[tokio::test]
    async fn mark_notified_and_list_changes() {
        let target = Target::new("https://example.com", "Example");
        let storage = MemoryStorage::with_targets([target.clone()]);
        let change = sample_change(target.id);
        storage.save_change(&change).await.unwrap();
        storage.save_change(&sample_change(Uuid::new_v4())).await.unwrap();

        storage.mark_change_notified(change.id).await.unwrap();

        let changes = storage.list_changes(Some(target.id), 10).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].notified);
        assert_eq!(storage.list_changes(None, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_history() {
        let target = Target::new("https://example.com", "Example");
        let storage = MemoryStorage::with_targets([target.clone()]);
        storage
            .save_snapshot(&Snapshot::capture(target.id, page("x")))
            .await
            .unwrap();

        assert!(storage.delete_target(target.id).await.unwrap());
        assert!(!storage.delete_target(target.id).await.unwrap());
        assert!(storage.get_latest_snapshot(target.id).await.unwrap().is_none());
    }
}
