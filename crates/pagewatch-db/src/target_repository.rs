use chrono::{DateTime, Utc};
use pagewatch_core::error::AppError;
use pagewatch_core::models::{FetchConfig, NotifyChannels, Target, TargetPatch};
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

const TARGET_COLUMNS: &str = "id, url, name, selector, check_interval, enabled, render_mode, \
     wait_for_selector, fetch_config, proxy, notify, ignore_noise, created_at, \
     last_checked_at, last_changed_at";

#[derive(Clone)]
pub struct TargetRepository {
    pool: Pool<Postgres>,
}

impl TargetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, target: &Target) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO targets (id, url, name, selector, check_interval, enabled, render_mode,
                                 wait_for_selector, fetch_config, proxy, notify, ignore_noise,
                                 created_at, last_checked_at, last_changed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(target.id)
        .bind(&target.url)
        .bind(&target.name)
        .bind(&target.selector)
        .bind(target.check_interval.as_str())
        .bind(target.enabled)
        .bind(target.render_mode.as_str())
        .bind(&target.wait_for_selector)
        .bind(target.fetch_config.as_ref().map(Json))
        .bind(&target.proxy)
        .bind(Json(&target.notify))
        .bind(target.ignore_noise)
        .bind(target.created_at)
        .bind(target.last_checked_at)
        .bind(target.last_changed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(e.to_string()))?;

        tracing::debug!(target_id = %target.id, url = %target.url, "Target created");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Target>, AppError> {
        let rows = sqlx::query_as::<_, TargetRow>(&format!(
            "SELECT {TARGET_COLUMNS} FROM targets ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Target>, AppError> {
        let row = sqlx::query_as::<_, TargetRow>(&format!(
            "SELECT {TARGET_COLUMNS} FROM targets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Fields left `None` in the patch keep their stored value.
    pub async fn update(&self, id: Uuid, patch: &TargetPatch) -> Result<Option<Target>, AppError> {
        let row = sqlx::query_as::<_, TargetRow>(&format!(
            r#"
            UPDATE targets
            SET name = COALESCE($2, name),
                url = COALESCE($3, url),
                check_interval = COALESCE($4, check_interval),
                enabled = COALESCE($5, enabled),
                last_checked_at = COALESCE($6, last_checked_at),
                last_changed_at = COALESCE($7, last_changed_at)
            WHERE id = $1
            RETURNING {TARGET_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.url)
        .bind(patch.check_interval.map(|i| i.as_str()))
        .bind(patch.enabled)
        .bind(patch.last_checked_at)
        .bind(patch.last_changed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Snapshots and changes go with the target (`ON DELETE CASCADE`).
    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM targets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct TargetRow {
    id: Uuid,
    url: String,
    name: String,
    selector: Option<String>,
    check_interval: String,
    enabled: bool,
    render_mode: String,
    wait_for_selector: Option<String>,
    fetch_config: Option<Json<FetchConfig>>,
    proxy: Option<String>,
    notify: Json<NotifyChannels>,
    ignore_noise: bool,
    created_at: DateTime<Utc>,
    last_checked_at: Option<DateTime<Utc>>,
    last_changed_at: Option<DateTime<Utc>>,
}

impl From<TargetRow> for Target {
    fn from(row: TargetRow) -> Self {
        Target {
            id: row.id,
            url: row.url,
            name: row.name,
            selector: row.selector,
            check_interval: row.check_interval.parse().unwrap_or_default(),
            enabled: row.enabled,
            render_mode: row.render_mode.parse().unwrap_or_default(),
            wait_for_selector: row.wait_for_selector,
            fetch_config: row.fetch_config.map(|c| c.0),
            proxy: row.proxy,
            notify: row.notify.0,
            ignore_noise: row.ignore_noise,
            created_at: row.created_at,
            last_checked_at: row.last_checked_at,
            last_changed_at: row.last_changed_at,
        }
    }
}
