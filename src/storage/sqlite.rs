//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds. Conditional entity writes
//! are single `UPDATE ... WHERE` statements, so the compare-and-set happens
//! inside SQLite and holds across pool connections.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{BackendHealth, EntityStore, ReportHistory, SettingsBackend, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::HealthReportRow;
use crate::lifecycle::{LifecycleEntity, LifecycleStatus, Milestone};
use crate::monitors::probe::ServiceHealthReport;
use crate::settings::MonitoringSettings;

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for WAL mode and a generous busy timeout
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use lifeguard::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./lifeguard.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn optional_timestamp(row: &SqliteRow, column: &str) -> Option<DateTime<Utc>> {
        row.get::<Option<i64>, _>(column)
            .map(Self::millis_to_timestamp)
    }

    fn row_to_entity(row: &SqliteRow) -> StorageResult<LifecycleEntity> {
        let status: String = row.get("status");
        let status = status
            .parse::<LifecycleStatus>()
            .map_err(StorageError::SerializationError)?;

        Ok(LifecycleEntity {
            id: row.get("id"),
            label: row.get("label"),
            recipient: row.get("recipient"),
            expires_at: Self::millis_to_timestamp(row.get("expires_at")),
            status,
            warning_7d_sent_at: Self::optional_timestamp(row, "warning_7d_sent_at"),
            warning_24h_sent_at: Self::optional_timestamp(row, "warning_24h_sent_at"),
            expired_notice_sent_at: Self::optional_timestamp(row, "expired_notice_sent_at"),
            updated_at: Self::millis_to_timestamp(row.get("updated_at")),
        })
    }

    fn milestone_column(milestone: Milestone) -> &'static str {
        match milestone {
            Milestone::SevenDayWarning => "warning_7d_sent_at",
            Milestone::DayWarning => "warning_24h_sent_at",
            Milestone::PostExpiry => "expired_notice_sent_at",
        }
    }

    fn status_rank(status: LifecycleStatus) -> i64 {
        match status {
            LifecycleStatus::Active => 0,
            LifecycleStatus::Expiring => 1,
            LifecycleStatus::Archived => 2,
        }
    }
}

const ENTITY_COLUMNS: &str = "id, label, recipient, expires_at, status, warning_7d_sent_at, \
                              warning_24h_sent_at, expired_notice_sent_at, updated_at";

#[async_trait]
impl SettingsBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn load_settings(&self) -> StorageResult<Option<MonitoringSettings>> {
        let row = sqlx::query("SELECT payload FROM monitoring_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: String = row.get("payload");
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, settings), fields(version = settings.version))]
    async fn save_settings(&self, settings: &MonitoringSettings) -> StorageResult<()> {
        let payload = serde_json::to_string(settings)?;
        let updated_at = settings.updated_at.unwrap_or_else(Utc::now);

        sqlx::query(
            r#"
            INSERT INTO monitoring_settings (id, version, payload, updated_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                version = excluded.version,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(settings.version as i64)
        .bind(payload)
        .bind(Self::timestamp_to_millis(&updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EntityStore for SqliteBackend {
    #[instrument(skip(self, entity), fields(entity = %entity.id))]
    async fn upsert_entity(&self, entity: &LifecycleEntity) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO lifecycle_entities (
                id, label, recipient, expires_at, status,
                warning_7d_sent_at, warning_24h_sent_at, expired_notice_sent_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                label = excluded.label,
                recipient = excluded.recipient,
                expires_at = excluded.expires_at,
                status = excluded.status,
                warning_7d_sent_at = excluded.warning_7d_sent_at,
                warning_24h_sent_at = excluded.warning_24h_sent_at,
                expired_notice_sent_at = excluded.expired_notice_sent_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entity.id)
        .bind(&entity.label)
        .bind(&entity.recipient)
        .bind(Self::timestamp_to_millis(&entity.expires_at))
        .bind(entity.status.as_str())
        .bind(entity.warning_7d_sent_at.as_ref().map(Self::timestamp_to_millis))
        .bind(entity.warning_24h_sent_at.as_ref().map(Self::timestamp_to_millis))
        .bind(entity.expired_notice_sent_at.as_ref().map(Self::timestamp_to_millis))
        .bind(Self::timestamp_to_millis(&entity.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_entity(&self, id: &str) -> StorageResult<Option<LifecycleEntity>> {
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM lifecycle_entities WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_entity).transpose()
    }

    async fn list_entities(&self) -> StorageResult<Vec<LifecycleEntity>> {
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM lifecycle_entities ORDER BY expires_at ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_entity).collect()
    }

    #[instrument(skip(self))]
    async fn list_due_for_check(&self) -> StorageResult<Vec<LifecycleEntity>> {
        let sql = format!(
            r#"
            SELECT {ENTITY_COLUMNS} FROM lifecycle_entities
            WHERE status != 'archived' OR expired_notice_sent_at IS NULL
            ORDER BY expires_at ASC
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let entities: Vec<LifecycleEntity> =
            rows.iter().map(Self::row_to_entity).collect::<StorageResult<_>>()?;
        debug!("{} entities due for check", entities.len());
        Ok(entities)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: &str,
        expected_expiry: DateTime<Utc>,
        status: LifecycleStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE lifecycle_entities
            SET status = ?, updated_at = ?
            WHERE id = ? AND expires_at = ?
              AND (CASE status WHEN 'active' THEN 0 WHEN 'expiring' THEN 1 ELSE 2 END) <= ?
            "#,
        )
        .bind(status.as_str())
        .bind(Self::timestamp_to_millis(&at))
        .bind(id)
        .bind(Self::timestamp_to_millis(&expected_expiry))
        .bind(Self::status_rank(status))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn claim_milestone(
        &self,
        id: &str,
        expected_expiry: DateTime<Utc>,
        milestone: Milestone,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let column = Self::milestone_column(milestone);
        let sql = format!(
            r#"
            UPDATE lifecycle_entities
            SET {column} = ?, updated_at = ?
            WHERE id = ? AND expires_at = ? AND {column} IS NULL
            "#
        );

        let at_millis = Self::timestamp_to_millis(&at);
        let result = sqlx::query(&sql)
            .bind(at_millis)
            .bind(at_millis)
            .bind(id)
            .bind(Self::timestamp_to_millis(&expected_expiry))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn renew_entity(
        &self,
        id: &str,
        new_expiry: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<LifecycleEntity>> {
        let result = sqlx::query(
            r#"
            UPDATE lifecycle_entities
            SET expires_at = ?, status = 'active',
                warning_7d_sent_at = NULL, warning_24h_sent_at = NULL,
                expired_notice_sent_at = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Self::timestamp_to_millis(&new_expiry))
        .bind(Self::timestamp_to_millis(&at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_entity(id).await
    }
}

#[async_trait]
impl ReportHistory for SqliteBackend {
    #[instrument(skip(self, row), fields(status = %row.status))]
    async fn insert_report(&self, row: HealthReportRow) -> StorageResult<()> {
        let report_json = serde_json::to_string(&row.report)?;

        sqlx::query(
            r#"
            INSERT INTO health_reports (
                checked_at, status, successful_target, attempt_count, duration_ms, report
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Self::timestamp_to_millis(&row.checked_at))
        .bind(row.status.as_str())
        .bind(&row.successful_target)
        .bind(row.attempt_count as i64)
        .bind(row.duration_ms as i64)
        .bind(report_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_latest_reports(&self, limit: usize) -> StorageResult<Vec<HealthReportRow>> {
        let rows = sqlx::query(
            r#"
            SELECT checked_at, status, successful_target, attempt_count, duration_ms, report
            FROM health_reports
            ORDER BY checked_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let report_str: String = row.get("report");
                let report: ServiceHealthReport = serde_json::from_str(&report_str)?;
                let status: String = row.get("status");

                Ok(HealthReportRow {
                    checked_at: Self::millis_to_timestamp(row.get("checked_at")),
                    status: status.parse().map_err(StorageError::SerializationError)?,
                    successful_target: row.get("successful_target"),
                    attempt_count: row.get::<i64, _>("attempt_count") as usize,
                    duration_ms: row.get::<i64, _>("duration_ms") as u64,
                    report,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_reports(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM health_reports WHERE checked_at < ?")
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old health reports", deleted);

        Ok(deleted)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<BackendHealth> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(BackendHealth {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(BackendHealth {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        let (entities,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lifecycle_entities")
            .fetch_one(&self.pool)
            .await?;

        let (reports,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM health_reports")
            .fetch_one(&self.pool)
            .await?;

        let file_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);
        let file_size_mb = file_size as f64 / 1_000_000.0;

        Ok(format!(
            "SQLite: {} entities, {} health reports, {:.2} MB on disk",
            entities, reports, file_size_mb
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
