use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ChangeRecord, FetchedPage, Snapshot, Target, TargetPatch};
use crate::notify::DispatchReport;

/// Retrieves and normalizes the content of a target.
pub trait PageFetcher: Send + Sync + Clone + 'static {
    fn fetch(&self, target: &Target) -> impl Future<Output = Result<FetchedPage, AppError>> + Send;
}

/// Persists targets, snapshots and change records.
///
/// Implementations report every failure as [`AppError::StorageError`].
pub trait Storage: Send + Sync + Clone + 'static {
    /// Cheap round trip proving the backend is reachable.
    fn health_check(&self) -> impl Future<Output = Result<(), AppError>> + Send;

    fn list_targets(&self) -> impl Future<Output = Result<Vec<Target>, AppError>> + Send;

    fn get_target(&self, id: Uuid) -> impl Future<Output = Result<Option<Target>, AppError>> + Send;

    fn create_target(&self, target: &Target) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Apply a partial update. Returns the updated target, or `None` if absent.
    fn update_target(
        &self,
        id: Uuid,
        patch: &TargetPatch,
    ) -> impl Future<Output = Result<Option<Target>, AppError>> + Send;

    /// Delete a target and its history. Returns whether it existed.
    fn delete_target(&self, id: Uuid) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn save_snapshot(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Remove a single snapshot. Returns whether it existed.
    fn delete_snapshot(&self, id: Uuid) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Most recently captured snapshot of a target.
    fn get_latest_snapshot(
        &self,
        target_id: Uuid,
    ) -> impl Future<Output = Result<Option<Snapshot>, AppError>> + Send;

    fn save_change(&self, change: &ChangeRecord) -> impl Future<Output = Result<(), AppError>> + Send;

    fn mark_change_notified(&self, id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Change history, newest first. `None` lists changes of every target.
    fn list_changes(
        &self,
        target_id: Option<Uuid>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ChangeRecord>, AppError>> + Send;
}

/// Fans a change out to the target's notification channels.
pub trait Notifier: Send + Sync + Clone + 'static {
    fn send_all(
        &self,
        target: &Target,
        change: &ChangeRecord,
    ) -> impl Future<Output = DispatchReport> + Send;
}
