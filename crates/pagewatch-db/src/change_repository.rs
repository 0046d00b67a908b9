use chrono::{DateTime, Utc};
use pagewatch_core::error::AppError;
use pagewatch_core::models::{ChangeRecord, DiffLine, Importance};
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Change records of significant changes.
#[derive(Clone)]
pub struct ChangeRepository {
    pool: Pool<Postgres>,
}

impl ChangeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, change: &ChangeRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO changes (id, target_id, previous_snapshot_id, current_snapshot_id,
                                 detected_at, change_type, summary, diff, importance, notified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(change.id)
        .bind(change.target_id)
        .bind(change.previous_snapshot_id)
        .bind(change.current_snapshot_id)
        .bind(change.detected_at)
        .bind(change.change_type.as_str())
        .bind(&change.summary)
        .bind(Json(&change.diff))
        .bind(change.importance.as_str())
        .bind(change.notified)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(())
    }

    pub async fn mark_notified(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE changes SET notified = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StorageError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::StorageError(format!("Change {id} not found")));
        }
        Ok(())
    }

    /// Newest first, optionally restricted to one target.
    pub async fn list(&self, target_id: Option<Uuid>, limit: usize) -> Result<Vec<ChangeRecord>, AppError> {
        let rows = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, target_id, previous_snapshot_id, current_snapshot_id, detected_at,
                   change_type, summary, diff, importance, notified
            FROM changes
            WHERE ($1::uuid IS NULL OR target_id = $1)
            ORDER BY detected_at DESC
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
struct ChangeRow {
    id: Uuid,
    target_id: Uuid,
    previous_snapshot_id: Uuid,
    current_snapshot_id: Uuid,
    detected_at: DateTime<Utc>,
    change_type: String,
    summary: String,
    diff: Json<Vec<DiffLine>>,
    importance: String,
    notified: bool,
}

impl From<ChangeRow> for ChangeRecord {
    fn from(row: ChangeRow) -> Self {
        ChangeRecord {
            id: row.id,
            target_id: row.target_id,
            previous_snapshot_id: row.previous_snapshot_id,
            current_snapshot_id: row.current_snapshot_id,
            detected_at: row.detected_at,
            change_type: row.change_type.parse().unwrap_or_default(),
            summary: row.summary,
            diff: row.diff.0,
            importance: row.importance.parse().unwrap_or(Importance::Low),
            notified: row.notified,
        }
    }
}
