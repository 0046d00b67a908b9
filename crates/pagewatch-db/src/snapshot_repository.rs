use chrono::{DateTime, Utc};
use pagewatch_core::error::AppError;
use pagewatch_core::models::{Snapshot, SnapshotMetadata};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

#[derive(Clone)]
pub struct SnapshotRepository {
    pool: Pool<Postgres>,
}

impl SnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (id, target_id, content, content_hash, captured_at,
                                   title, status_code, response_time_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(snapshot.id)
        .bind(snapshot.target_id)
        .bind(&snapshot.content)
        .bind(&snapshot.content_hash)
        .bind(snapshot.captured_at)
        .bind(&snapshot.metadata.title)
        .bind(i32::from(snapshot.metadata.status_code))
        .bind(snapshot.metadata.response_time_ms as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM snapshots WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn latest(&self, target_id: Uuid) -> Result<Option<Snapshot>, AppError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, target_id, content, content_hash, captured_at,
                   title, status_code, response_time_ms
            FROM snapshots
            WHERE target_id = $1
            ORDER BY captured_at DESC
            LIMIT 1
            "#,
        )
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Snapshot history of a target, newest first.
    pub async fn history(&self, target_id: Uuid, limit: usize) -> Result<Vec<Snapshot>, AppError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, target_id, content, content_hash, captured_at,
                   title, status_code, response_time_ms
            FROM snapshots
            WHERE target_id = $1
            ORDER BY captured_at DESC
            LIMIT $2
            "#,
        )
        .bind(target_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    target_id: Uuid,
    content: String,
    content_hash: String,
    captured_at: DateTime<Utc>,
    title: Option<String>,
    status_code: i32,
    response_time_ms: i64,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Snapshot {
            id: row.id,
            target_id: row.target_id,
            content: row.content,
            content_hash: row.content_hash,
            captured_at: row.captured_at,
            metadata: SnapshotMetadata {
                title: row.title,
                status_code: row.status_code.try_into().unwrap_or_default(),
                response_time_ms: row.response_time_ms.try_into().unwrap_or_default(),
            },
        }
    }
}
