//! In-memory storage (no persistence)
//!
//! Map-backed implementation of [`Storage`] used by tests and useful for
//! trying the engine without a database file. Cascade deletes mirror the
//! SQLite foreign-key behavior so both implementations are interchangeable.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::backend::Storage;
use super::error::{StorageError, StorageResult};
use super::models::{
    AlertRecord, Check, CheckResult, CheckStats, HourlyAggregate, Incident, Verdict,
};

const HOUR_MILLIS: i64 = 3_600_000;

#[derive(Default)]
struct Inner {
    checks: HashMap<i64, Check>,
    results: Vec<CheckResult>,
    incidents: HashMap<i64, Incident>,
    alerts: Vec<AlertRecord>,
    aggregates: Vec<HourlyAggregate>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_name(&self, check_id: i64) -> String {
        self.checks
            .get(&check_id)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }
}

/// In-memory [`Storage`] implementation.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn window_stats(results: &[&CheckResult], since: DateTime<Utc>) -> (f64, i64) {
        let window: Vec<_> = results.iter().filter(|r| r.checked_at > since).collect();
        if window.is_empty() {
            return (100.0, 0);
        }

        let up: Vec<_> = window
            .iter()
            .filter(|r| r.verdict == Verdict::Up)
            .collect();
        let uptime = up.len() as f64 / window.len() as f64 * 100.0;
        let avg = if up.is_empty() {
            0
        } else {
            (up.iter().map(|r| r.response_time_ms).sum::<u64>() / up.len() as u64) as i64
        };

        (uptime, avg)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_check(&self, check: &Check) -> StorageResult<Check> {
        let mut inner = self.inner.write().await;
        let mut stored = check.clone();
        stored.id = inner.next_id();
        let now = Utc::now();
        stored.created_at = now;
        stored.updated_at = now;
        inner.checks.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn check(&self, id: i64) -> StorageResult<Option<Check>> {
        Ok(self.inner.read().await.checks.get(&id).cloned())
    }

    async fn check_by_url(&self, url: &str) -> StorageResult<Option<Check>> {
        Ok(self
            .inner
            .read()
            .await
            .checks
            .values()
            .find(|c| c.url == url)
            .cloned())
    }

    async fn list_checks(&self) -> StorageResult<Vec<Check>> {
        let mut checks: Vec<Check> = self.inner.read().await.checks.values().cloned().collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(checks)
    }

    async fn list_enabled_checks(&self) -> StorageResult<Vec<Check>> {
        let mut checks: Vec<Check> = self
            .inner
            .read()
            .await
            .checks
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(checks)
    }

    async fn list_checks_by_tag(&self, tag: &str) -> StorageResult<Vec<Check>> {
        let checks = self.list_enabled_checks().await?;
        Ok(checks
            .into_iter()
            .filter(|c| c.tags.iter().any(|t| t == tag))
            .collect())
    }

    async fn update_check(&self, check: &Check) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        match inner.checks.get_mut(&check.id) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = check.clone();
                existing.created_at = created_at;
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StorageError::NotFound("check".to_string())),
        }
    }

    async fn delete_check(&self, id: i64) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.checks.remove(&id);
        inner.results.retain(|r| r.check_id != id);

        let incident_ids: Vec<i64> = inner
            .incidents
            .values()
            .filter(|i| i.check_id == id)
            .map(|i| i.id)
            .collect();
        inner.incidents.retain(|_, i| i.check_id != id);
        inner
            .alerts
            .retain(|a| !incident_ids.contains(&a.incident_id));
        inner.aggregates.retain(|a| a.check_id != id);
        Ok(())
    }

    async fn save_result(&self, result: &CheckResult) -> StorageResult<CheckResult> {
        let mut inner = self.inner.write().await;
        let mut stored = result.clone();
        stored.id = inner.next_id();
        stored.checked_at = Utc::now();
        inner.results.push(stored.clone());
        Ok(stored)
    }

    async fn results(
        &self,
        check_id: i64,
        limit: i64,
        offset: i64,
    ) -> StorageResult<Vec<CheckResult>> {
        let inner = self.inner.read().await;
        let mut results: Vec<CheckResult> = inner
            .results
            .iter()
            .filter(|r| r.check_id == check_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| (b.checked_at, b.id).cmp(&(a.checked_at, a.id)));
        Ok(results
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn latest_result(&self, check_id: i64) -> StorageResult<Option<CheckResult>> {
        Ok(self.results(check_id, 1, 0).await?.into_iter().next())
    }

    async fn results_in_range(
        &self,
        check_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<CheckResult>> {
        let inner = self.inner.read().await;
        let mut results: Vec<CheckResult> = inner
            .results
            .iter()
            .filter(|r| r.check_id == check_id && r.checked_at >= start && r.checked_at <= end)
            .cloned()
            .collect();
        results.sort_by(|a, b| (a.checked_at, a.id).cmp(&(b.checked_at, b.id)));
        Ok(results)
    }

    async fn recent_results(&self, check_id: i64, count: i64) -> StorageResult<Vec<CheckResult>> {
        self.results(check_id, count, 0).await
    }

    async fn check_stats(&self, check_id: i64) -> StorageResult<CheckStats> {
        let inner = self.inner.read().await;
        let results: Vec<&CheckResult> = inner
            .results
            .iter()
            .filter(|r| r.check_id == check_id)
            .collect();

        let now = Utc::now();
        let (uptime_24h, avg_24h) = Self::window_stats(&results, now - chrono::Duration::hours(24));
        let (uptime_7d, avg_7d) = Self::window_stats(&results, now - chrono::Duration::days(7));
        let (uptime_30d, avg_30d) = Self::window_stats(&results, now - chrono::Duration::days(30));

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
        let mut inner = self.inner.write().await;
        let mut stored = incident.clone();
        stored.id = inner.next_id();
        stored.check_name = inner.check_name(stored.check_id);
        inner.incidents.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn incident(&self, id: i64) -> StorageResult<Option<Incident>> {
        Ok(self.inner.read().await.incidents.get(&id).cloned())
    }

    async fn active_incident(&self, check_id: i64) -> StorageResult<Option<Incident>> {
        Ok(self
            .inner
            .read()
            .await
            .incidents
            .values()
            .find(|i| i.check_id == check_id && i.is_active())
            .cloned())
    }

    async fn close_incident(&self, id: i64, ended_at: DateTime<Utc>) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        match inner.incidents.get_mut(&id) {
            Some(incident) => {
                incident.duration_seconds = Some((ended_at - incident.started_at).num_seconds());
                incident.ended_at = Some(ended_at);
                Ok(())
            }
            None => Err(StorageError::NotFound("incident".to_string())),
        }
    }

    async fn list_incidents(&self, limit: i64, offset: i64) -> StorageResult<Vec<Incident>> {
        let inner = self.inner.read().await;
        let mut incidents: Vec<Incident> = inner.incidents.values().cloned().collect();
        incidents.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
        Ok(incidents
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn incidents_for_check(
        &self,
        check_id: i64,
        limit: i64,
    ) -> StorageResult<Vec<Incident>> {
        let inner = self.inner.read().await;
        let mut incidents: Vec<Incident> = inner
            .incidents
            .values()
            .filter(|i| i.check_id == check_id)
            .cloned()
            .collect();
        incidents.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
        Ok(incidents.into_iter().take(limit.max(0) as usize).collect())
    }

    async fn log_alert(&self, record: &AlertRecord) -> StorageResult<AlertRecord> {
        let mut inner = self.inner.write().await;
        let mut stored = record.clone();
        stored.id = inner.next_id();
        stored.sent_at = Utc::now();
        inner.alerts.push(stored.clone());
        Ok(stored)
    }

    async fn last_alert_for_incident(
        &self,
        incident_id: i64,
        channel: &str,
    ) -> StorageResult<Option<AlertRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .alerts
            .iter()
            .filter(|a| a.incident_id == incident_id && a.channel == channel)
            .max_by_key(|a| (a.sent_at, a.id))
            .cloned())
    }

    async fn aggregate_results(&self, older_than: DateTime<Utc>) -> StorageResult<()> {
        let mut inner = self.inner.write().await;

        let mut buckets: HashMap<(i64, i64), Vec<CheckResult>> = HashMap::new();
        for result in inner.results.iter().filter(|r| r.checked_at < older_than) {
            let hour = result.checked_at.timestamp_millis() / HOUR_MILLIS * HOUR_MILLIS;
            buckets
                .entry((result.check_id, hour))
                .or_default()
                .push(result.clone());
        }

        for ((check_id, hour), results) in buckets {
            let total = results.len() as i64;
            let up: Vec<&CheckResult> = results
                .iter()
                .filter(|r| r.verdict == Verdict::Up)
                .collect();
            let success = up.len() as i64;

            let aggregate = HourlyAggregate {
                id: 0,
                check_id,
                hour: DateTime::from_timestamp_millis(hour).unwrap_or_else(Utc::now),
                total_checks: total,
                success_count: success,
                failure_count: total - success,
                avg_response_ms: if up.is_empty() {
                    0
                } else {
                    (up.iter().map(|r| r.response_time_ms).sum::<u64>() / up.len() as u64) as i64
                },
                min_response_ms: up.iter().map(|r| r.response_time_ms as i64).min().unwrap_or(0),
                max_response_ms: up.iter().map(|r| r.response_time_ms as i64).max().unwrap_or(0),
                uptime_percent: success as f64 / total as f64 * 100.0,
            };

            inner
                .aggregates
                .retain(|a| !(a.check_id == check_id && a.hour == aggregate.hour));
            let id = inner.next_id();
            inner.aggregates.push(HourlyAggregate { id, ..aggregate });
        }

        Ok(())
    }

    async fn hourly_aggregates(
        &self,
        check_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<HourlyAggregate>> {
        let inner = self.inner.read().await;
        let mut aggregates: Vec<HourlyAggregate> = inner
            .aggregates
            .iter()
            .filter(|a| a.check_id == check_id && a.hour >= start && a.hour <= end)
            .cloned()
            .collect();
        aggregates.sort_by_key(|a| a.hour);
        Ok(aggregates)
    }

    async fn delete_results_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.results.len();
        inner.results.retain(|r| r.checked_at >= cutoff);
        Ok((before - inner.results.len()) as u64)
    }

    async fn delete_aggregates_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.aggregates.len();
        inner.aggregates.retain(|a| a.hour >= cutoff);
        Ok((before - inner.aggregates.len()) as u64)
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
