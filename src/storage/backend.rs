//! Storage trait definition
//!
//! This module defines the `Storage` trait that all persistence
//! implementations must implement. The monitoring engine only ever talks to
//! this trait; the SQLite implementation and the in-memory test double are
//! interchangeable behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::models::{
    AlertRecord, Check, CheckResult, CheckStats, HourlyAggregate, Incident,
};

/// Trait for persistent monitoring state
///
/// ## Conventions
///
/// - Creation methods return the stored row with its id and timestamps
///   filled in.
/// - Lookup methods return `Ok(None)` when no row matches; `Err` is reserved
///   for actual storage failures.
/// - Implementations must be `Send + Sync`: the scheduler shares one handle
///   across all per-check workers.
#[async_trait]
pub trait Storage: Send + Sync {
    // Checks

    async fn create_check(&self, check: &Check) -> StorageResult<Check>;

    async fn check(&self, id: i64) -> StorageResult<Option<Check>>;

    async fn check_by_url(&self, url: &str) -> StorageResult<Option<Check>>;

    async fn list_checks(&self) -> StorageResult<Vec<Check>>;

    async fn list_enabled_checks(&self) -> StorageResult<Vec<Check>>;

    async fn list_checks_by_tag(&self, tag: &str) -> StorageResult<Vec<Check>>;

    async fn update_check(&self, check: &Check) -> StorageResult<()>;

    /// Deletes a check and cascades to its results, incidents and the
    /// incidents' alert log rows.
    async fn delete_check(&self, id: i64) -> StorageResult<()>;

    // Results

    async fn save_result(&self, result: &CheckResult) -> StorageResult<CheckResult>;

    /// Results for a check in reverse chronological order.
    async fn results(&self, check_id: i64, limit: i64, offset: i64)
        -> StorageResult<Vec<CheckResult>>;

    async fn latest_result(&self, check_id: i64) -> StorageResult<Option<CheckResult>>;

    /// Results in `[start, end]`, oldest first.
    async fn results_in_range(
        &self,
        check_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<CheckResult>>;

    /// The `count` most recent results, newest first.
    async fn recent_results(&self, check_id: i64, count: i64) -> StorageResult<Vec<CheckResult>>;

    /// Uptime/latency statistics over 24 h / 7 d / 30 d windows. Empty
    /// windows report 100 % uptime.
    async fn check_stats(&self, check_id: i64) -> StorageResult<CheckStats>;

    // Incidents

    async fn create_incident(&self, incident: &Incident) -> StorageResult<Incident>;

    async fn incident(&self, id: i64) -> StorageResult<Option<Incident>>;

    /// The open (null `ended_at`) incident for a check, if any.
    async fn active_incident(&self, check_id: i64) -> StorageResult<Option<Incident>>;

    /// Closes an incident, computing `duration_seconds` from `started_at`.
    async fn close_incident(&self, id: i64, ended_at: DateTime<Utc>) -> StorageResult<()>;

    async fn list_incidents(&self, limit: i64, offset: i64) -> StorageResult<Vec<Incident>>;

    async fn incidents_for_check(&self, check_id: i64, limit: i64)
        -> StorageResult<Vec<Incident>>;

    // Alert log

    async fn log_alert(&self, record: &AlertRecord) -> StorageResult<AlertRecord>;

    async fn last_alert_for_incident(
        &self,
        incident_id: i64,
        channel: &str,
    ) -> StorageResult<Option<AlertRecord>>;

    // Aggregates

    /// Rolls results older than `older_than` into `hourly_aggregates`.
    async fn aggregate_results(&self, older_than: DateTime<Utc>) -> StorageResult<()>;

    async fn hourly_aggregates(
        &self,
        check_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<HourlyAggregate>>;

    // Maintenance

    /// Deletes results observed before the cutoff; returns the row count.
    async fn delete_results_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    async fn delete_aggregates_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    async fn close(&self) -> StorageResult<()>;
}
