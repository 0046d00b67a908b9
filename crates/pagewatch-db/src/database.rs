use pagewatch_core::AppError;
use pagewatch_core::models::{ChangeRecord, Snapshot, Target, TargetPatch};
use pagewatch_core::traits::Storage;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::change_repository::ChangeRepository;
use crate::config::DatabaseConfig;
use crate::snapshot_repository::SnapshotRepository;
use crate::target_repository::TargetRepository;

/// Database facade: owns the pool, runs migrations and vends repositories.
///
/// Implements [`Storage`] by delegating to the repositories, so the
/// scheduler can run directly against PostgreSQL.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to connect: {e}")))?;

        tracing::debug!(max_connections = config.max_connections, "Database pool ready");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::StorageError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    pub fn targets(&self) -> TargetRepository {
        TargetRepository::new(self.pool.clone())
    }

    pub fn snapshots(&self) -> SnapshotRepository {
        SnapshotRepository::new(self.pool.clone())
    }

    pub fn changes(&self) -> ChangeRepository {
        ChangeRepository::new(self.pool.clone())
    }

}

impl Storage for Database {
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn list_targets(&self) -> Result<Vec<Target>, AppError> {
        self.targets().list().await
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, AppError> {
        self.targets().get(id).await
    }

    async fn create_target(&self, target: &Target) -> Result<(), AppError> {
        self.targets().create(target).await
    }

    async fn update_target(&self, id: Uuid, patch: &TargetPatch) -> Result<Option<Target>, AppError> {
        self.targets().update(id, patch).await
    }

    async fn delete_target(&self, id: Uuid) -> Result<bool, AppError> {
        self.targets().delete(id).await
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        self.snapshots().save(snapshot).await
    }

    async fn delete_snapshot(&self, id: Uuid) -> Result<bool, AppError> {
        self.snapshots().delete(id).await
    }

    async fn get_latest_snapshot(&self, target_id: Uuid) -> Result<Option<Snapshot>, AppError> {
        self.snapshots().latest(target_id).await
    }

    async fn save_change(&self, change: &ChangeRecord) -> Result<(), AppError> {
        self.changes().save(change).await
    }

    async fn mark_change_notified(&self, id: Uuid) -> Result<(), AppError> {
        self.changes().mark_notified(id).await
    }

    async fn list_changes(
        &self,
        target_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>, AppError> {
        self.changes().list(target_id, limit).await
    }
}
