//! SQLite storage implementation
//!
//! Embedded store backing the monitoring engine. Configured the way the
//! engine's concurrency model expects:
//!
//! - **WAL mode** so dashboard reads do not block worker writes
//! - **Foreign keys on** so deleting a check cascades to its results,
//!   incidents and alert log rows
//! - **5 s busy timeout** to absorb transient lock contention between
//!   workers without surfacing errors
//!
//! Timestamps are stored as unix milliseconds; tags as a JSON array string.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::Storage;
use super::error::{StorageError, StorageResult};
use super::models::{
    AlertRecord, Check, CheckResult, CheckStats, HourlyAggregate, Incident, Verdict,
};

const HOUR_MILLIS: i64 = 3_600_000;

/// SQLite-backed [`Storage`] implementation.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    /// Opens (creating if missing) the database at `db_path` and runs
    /// migrations.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref();
        info!("initializing SQLite storage at {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    fn to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn from_millis(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn decode_check(row: &SqliteRow) -> StorageResult<Check> {
        let tags_json: Option<String> = row.get("tags");
        let tags = match tags_json {
            Some(json) if !json.is_empty() => serde_json::from_str(&json)?,
            _ => Vec::new(),
        };

        Ok(Check {
            id: row.get("id"),
            name: row.get("name"),
            url: row.get("url"),
            interval_seconds: row.get("interval_seconds"),
            timeout_seconds: row.get("timeout_seconds"),
            expected_status: row.get::<i64, _>("expected_status") as u16,
            enabled: row.get("enabled"),
            tags,
            created_at: Self::from_millis(row.get("created_at")),
            updated_at: Self::from_millis(row.get("updated_at")),
        })
    }

    fn decode_result(row: &SqliteRow) -> CheckResult {
        let status: String = row.get("status");
        CheckResult {
            id: row.get("id"),
            check_id: row.get("check_id"),
            verdict: Verdict::from_str(&status),
            status_code: row.get::<i64, _>("status_code") as u16,
            response_time_ms: row.get::<i64, _>("response_time_ms") as u64,
            error_message: row
                .get::<Option<String>, _>("error_message")
                .unwrap_or_default(),
            ssl_expires_at: row
                .get::<Option<i64>, _>("ssl_expires_at")
                .map(Self::from_millis),
            ssl_days_left: row.get("ssl_days_left"),
            ssl_issuer: row.get("ssl_issuer"),
            checked_at: Self::from_millis(row.get("checked_at")),
        }
    }

    fn decode_incident(row: &SqliteRow) -> Incident {
        Incident {
            id: row.get("id"),
            check_id: row.get("check_id"),
            started_at: Self::from_millis(row.get("started_at")),
            ended_at: row
                .get::<Option<i64>, _>("ended_at")
                .map(Self::from_millis),
            duration_seconds: row.get("duration_seconds"),
            cause: row.get::<Option<String>, _>("cause").unwrap_or_default(),
            check_name: row.get("check_name"),
        }
    }

    async fn window_stats(
        &self,
        check_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<(f64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(100.0 * SUM(CASE WHEN status = 'up' THEN 1 ELSE 0 END)
                    / NULLIF(COUNT(*), 0), 100.0) AS uptime,
                COALESCE(AVG(CASE WHEN status = 'up' THEN response_time_ms END), 0.0)
                    AS avg_response
            FROM check_results
            WHERE check_id = ? AND checked_at > ?
            "#,
        )
        .bind(check_id)
        .bind(Self::to_millis(&since))
        .fetch_one(&self.pool)
        .await?;

        let uptime: f64 = row.get("uptime");
        let avg_response: f64 = row.get("avg_response");
        Ok((uptime, avg_response as i64))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_check(&self, check: &Check) -> StorageResult<Check> {
        let now = Utc::now();
        let tags_json = serde_json::to_string(&check.tags)?;

        let result = sqlx::query(
            r#"
            INSERT INTO checks
                (name, url, interval_seconds, timeout_seconds, expected_status,
                 enabled, tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&check.name)
        .bind(&check.url)
        .bind(check.interval_seconds)
        .bind(check.timeout_seconds)
        .bind(check.expected_status as i64)
        .bind(check.enabled)
        .bind(tags_json)
        .bind(Self::to_millis(&now))
        .bind(Self::to_millis(&now))
        .execute(&self.pool)
        .await?;

        let mut stored = check.clone();
        stored.id = result.last_insert_rowid();
        stored.created_at = now;
        stored.updated_at = now;
        Ok(stored)
    }

    async fn check(&self, id: i64) -> StorageResult<Option<Check>> {
        let row = sqlx::query("SELECT * FROM checks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::decode_check(&r)).transpose()
    }

    async fn check_by_url(&self, url: &str) -> StorageResult<Option<Check>> {
        let row = sqlx::query("SELECT * FROM checks WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::decode_check(&r)).transpose()
    }

    async fn list_checks(&self) -> StorageResult<Vec<Check>> {
        let rows = sqlx::query("SELECT * FROM checks ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode_check).collect()
    }

    async fn list_enabled_checks(&self) -> StorageResult<Vec<Check>> {
        let rows = sqlx::query("SELECT * FROM checks WHERE enabled = 1 ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode_check).collect()
    }

    async fn list_checks_by_tag(&self, tag: &str) -> StorageResult<Vec<Check>> {
        // SQLite JSON support is not assumed; filter on the decoded rows.
        let checks = self.list_enabled_checks().await?;
        Ok(checks
            .into_iter()
            .filter(|c| c.tags.iter().any(|t| t == tag))
            .collect())
    }

    async fn update_check(&self, check: &Check) -> StorageResult<()> {
        let tags_json = serde_json::to_string(&check.tags)?;

        sqlx::query(
            r#"
            UPDATE checks
            SET name = ?, url = ?, interval_seconds = ?, timeout_seconds = ?,
                expected_status = ?, enabled = ?, tags = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&check.name)
        .bind(&check.url)
        .bind(check.interval_seconds)
        .bind(check.timeout_seconds)
        .bind(check.expected_status as i64)
        .bind(check.enabled)
        .bind(tags_json)
        .bind(Self::to_millis(&Utc::now()))
        .bind(check.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_check(&self, id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM checks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_result(&self, result: &CheckResult) -> StorageResult<CheckResult> {
        let now = Utc::now();

        let res = sqlx::query(
            r#"
            INSERT INTO check_results
                (check_id, status, status_code, response_time_ms, error_message,
                 ssl_expires_at, ssl_days_left, ssl_issuer, checked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.check_id)
        .bind(result.verdict.as_str())
        .bind(result.status_code as i64)
        .bind(result.response_time_ms as i64)
        .bind(&result.error_message)
        .bind(result.ssl_expires_at.as_ref().map(Self::to_millis))
        .bind(result.ssl_days_left)
        .bind(&result.ssl_issuer)
        .bind(Self::to_millis(&now))
        .execute(&self.pool)
        .await?;

        let mut stored = result.clone();
        stored.id = res.last_insert_rowid();
        stored.checked_at = now;
        Ok(stored)
    }

    async fn results(
        &self,
        check_id: i64,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<CheckResult>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM check_results
            WHERE check_id = ?
            ORDER BY checked_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(check_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::decode_result).collect())
    }

    async fn latest_result(&self, check_id: i64) -> StorageResult<Option<CheckResult>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM check_results
            WHERE check_id = ?
            ORDER BY checked_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(check_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::decode_result(&r)))
    }

    async fn results_in_range(
        &self,
        check_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<CheckResult>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM check_results
            WHERE check_id = ? AND checked_at BETWEEN ? AND ?
            ORDER BY checked_at, id
            "#,
        )
        .bind(check_id)
        .bind(Self::to_millis(&start))
        .bind(Self::to_millis(&end))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::decode_result).collect())
    }

    async fn recent_results(&self, check_id: i64, count: i64) -> StorageResult<Vec<CheckResult>> {
        self.results(check_id, count, 0).await
    }

    async fn check_stats(&self, check_id: i64) -> StorageResult<CheckStats> {
        let now = Utc::now();

        let (uptime_24h, avg_24h) = self
            .window_stats(check_id, now - chrono::Duration::hours(24))
            .await?;
        let (uptime_7d, avg_7d) = self
            .window_stats(check_id, now - chrono::Duration::days(7))
            .await?;
        let (uptime_30d, avg_30d) = self
            .window_stats(check_id, now - chrono::Duration::days(30))
            .await?;

        Ok(CheckStats {
            uptime_percent_24h: uptime_24h,
            uptime_percent_7d: uptime_7d,
            uptime_percent_30d: uptime_30d,
            avg_response_ms_24h: avg_24h,
            avg_response_ms_7d: avg_7d,
            avg_response_ms_30d: avg_30d,
        })
    }

    async fn create_incident(&self, incident: &Incident) -> StorageResult<Incident> {
        let res = sqlx::query(
            "INSERT INTO incidents (check_id, started_at, cause) VALUES (?, ?, ?)",
        )
        .bind(incident.check_id)
        .bind(Self::to_millis(&incident.started_at))
        .bind(&incident.cause)
        .execute(&self.pool)
        .await?;

        let mut stored = incident.clone();
        stored.id = res.last_insert_rowid();
        Ok(stored)
    }

    async fn incident(&self, id: i64) -> StorageResult<Option<Incident>> {
        let row = sqlx::query(
            r#"
            SELECT i.*, c.name AS check_name
            FROM incidents i JOIN checks c ON c.id = i.check_id
            WHERE i.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::decode_incident(&r)))
    }

    async fn active_incident(&self, check_id: i64) -> StorageResult<Option<Incident>> {
        let row = sqlx::query(
            r#"
            SELECT i.*, c.name AS check_name
            FROM incidents i JOIN checks c ON c.id = i.check_id
            WHERE i.check_id = ? AND i.ended_at IS NULL
            "#,
        )
        .bind(check_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::decode_incident(&r)))
    }

    async fn close_incident(&self, id: i64, ended_at: DateTime<Utc>) -> StorageResult<()> {
        let incident = self
            .incident(id)
            .await?
            .ok_or_else(|| StorageError::NotFound("incident".to_string()))?;

        let duration = (ended_at - incident.started_at).num_seconds();

        sqlx::query("UPDATE incidents SET ended_at = ?, duration_seconds = ? WHERE id = ?")
            .bind(Self::to_millis(&ended_at))
            .bind(duration)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_incidents(&self, limit: i64, offset: i64) -> StorageResult<Vec<Incident>> {
        let rows = sqlx::query(
            r#"
            SELECT i.*, c.name AS check_name
            FROM incidents i JOIN checks c ON c.id = i.check_id
            ORDER BY i.started_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::decode_incident).collect())
    }

    async fn incidents_for_check(
        &self,
        check_id: i64,
        limit: i64,
    ) -> StorageResult<Vec<Incident>> {
        let rows = sqlx::query(
            r#"
            SELECT i.*, c.name AS check_name
            FROM incidents i JOIN checks c ON c.id = i.check_id
            WHERE i.check_id = ?
            ORDER BY i.started_at DESC
            LIMIT ?
            "#,
        )
        .bind(check_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::decode_incident).collect())
    }

    async fn log_alert(&self, record: &AlertRecord) -> StorageResult<AlertRecord> {
        let now = Utc::now();

        let res = sqlx::query(
            r#"
            INSERT INTO alert_log (incident_id, channel, sent_at, success, error_message)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.incident_id)
        .bind(&record.channel)
        .bind(Self::to_millis(&now))
        .bind(record.success)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        let mut stored = record.clone();
        stored.id = res.last_insert_rowid();
        stored.sent_at = now;
        Ok(stored)
    }

    async fn last_alert_for_incident(
        &self,
        incident_id: i64,
        channel: &str,
    ) -> StorageResult<Option<AlertRecord>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM alert_log
            WHERE incident_id = ? AND channel = ?
            ORDER BY sent_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(incident_id)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| AlertRecord {
            id: r.get("id"),
            incident_id: r.get("incident_id"),
            channel: r.get("channel"),
            sent_at: Self::from_millis(r.get("sent_at")),
            success: r.get("success"),
            error_message: r
                .get::<Option<String>, _>("error_message")
                .unwrap_or_default(),
        }))
    }

    async fn aggregate_results(&self, older_than: DateTime<Utc>) -> StorageResult<()> {
        let cutoff = Self::to_millis(&older_than);
        let checks = self.list_checks().await?;

        for check in checks {
            let rows = sqlx::query(
                r#"
                SELECT
                    (checked_at / 3600000) * 3600000 AS hour,
                    COUNT(*) AS total,
                    SUM(CASE WHEN status = 'up' THEN 1 ELSE 0 END) AS success,
                    SUM(CASE WHEN status = 'down' THEN 1 ELSE 0 END) AS failure,
                    AVG(CASE WHEN status = 'up' THEN response_time_ms END) AS avg_ms,
                    MIN(CASE WHEN status = 'up' THEN response_time_ms END) AS min_ms,
                    MAX(CASE WHEN status = 'up' THEN response_time_ms END) AS max_ms
                FROM check_results
                WHERE check_id = ? AND checked_at < ?
                GROUP BY hour
                "#,
            )
            .bind(check.id)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                let hour: i64 = row.get("hour");
                let total: i64 = row.get("total");
                let success: i64 = row.get("success");
                let failure: i64 = row.get("failure");
                let avg_ms: Option<f64> = row.get("avg_ms");
                let min_ms: Option<i64> = row.get("min_ms");
                let max_ms: Option<i64> = row.get("max_ms");

                let uptime_percent = if total > 0 {
                    success as f64 / total as f64 * 100.0
                } else {
                    0.0
                };

                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO hourly_aggregates
                        (check_id, hour, total_checks, success_count, failure_count,
                         avg_response_ms, min_response_ms, max_response_ms, uptime_percent)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(check.id)
                .bind(hour)
                .bind(total)
                .bind(success)
                .bind(failure)
                .bind(avg_ms.map(|v| v as i64).unwrap_or(0))
                .bind(min_ms.unwrap_or(0))
                .bind(max_ms.unwrap_or(0))
                .bind(uptime_percent)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn hourly_aggregates(
        &self,
        check_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<HourlyAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM hourly_aggregates
            WHERE check_id = ? AND hour BETWEEN ? AND ?
            ORDER BY hour
            "#,
        )
        .bind(check_id)
        .bind(Self::to_millis(&start) / HOUR_MILLIS * HOUR_MILLIS)
        .bind(Self::to_millis(&end))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| HourlyAggregate {
                id: r.get("id"),
                check_id: r.get("check_id"),
                hour: Self::from_millis(r.get("hour")),
                total_checks: r.get("total_checks"),
                success_count: r.get("success_count"),
                failure_count: r.get("failure_count"),
                avg_response_ms: r.get::<Option<i64>, _>("avg_response_ms").unwrap_or(0),
                min_response_ms: r.get::<Option<i64>, _>("min_response_ms").unwrap_or(0),
                max_response_ms: r.get::<Option<i64>, _>("max_response_ms").unwrap_or(0),
                uptime_percent: r.get::<Option<f64>, _>("uptime_percent").unwrap_or(0.0),
            })
            .collect())
    }

    async fn delete_results_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let res = sqlx::query("DELETE FROM check_results WHERE checked_at < ?")
            .bind(Self::to_millis(&cutoff))
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected())
    }

    async fn delete_aggregates_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let res = sqlx::query("DELETE FROM hourly_aggregates WHERE hour < ?")
            .bind(Self::to_millis(&cutoff))
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected())
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite storage");
        self.pool.close().await;
        Ok(())
    }
}
