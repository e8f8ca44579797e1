//! Persistent data model: checks, results, incidents, alert log entries.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a single probe outcome.
///
/// `pending` is deliberately not a verdict: an endpoint with no stored
/// results reads as pending, but every persisted result is either up or down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Up,
    Down,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Up => "up",
            Verdict::Down => "down",
        }
    }

    pub fn from_str(s: &str) -> Verdict {
        match s {
            "up" => Verdict::Up,
            _ => Verdict::Down,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored endpoint: one URL with its scheduling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub interval_seconds: i64,
    pub timeout_seconds: i64,
    pub expected_status: u16,
    pub enabled: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new check, with defaulting semantics.
///
/// Zero/absent values resolve to: interval 3600 s, timeout 10 s, expected
/// status 200, enabled true.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckInput {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub interval_seconds: i64,
    #[serde(default)]
    pub timeout_seconds: i64,
    #[serde(default)]
    pub expected_status: u16,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CheckInput {
    pub fn into_check(self) -> Check {
        let now = Utc::now();
        Check {
            id: 0,
            name: self.name,
            url: self.url,
            interval_seconds: if self.interval_seconds > 0 {
                self.interval_seconds
            } else {
                3600
            },
            timeout_seconds: if self.timeout_seconds > 0 {
                self.timeout_seconds
            } else {
                10
            },
            expected_status: if self.expected_status > 0 {
                self.expected_status
            } else {
                200
            },
            enabled: self.enabled.unwrap_or(true),
            tags: self.tags,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One recorded probe outcome for a check.
///
/// `status_code` is 0 when no HTTP reply was received. `error_message` is
/// empty for clean HTTP exchanges, including non-matching status codes.
/// The SSL fields are populated only for responses that completed over TLS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: i64,
    pub check_id: i64,
    pub verdict: Verdict,
    pub status_code: u16,
    pub response_time_ms: u64,
    pub error_message: String,
    pub ssl_expires_at: Option<DateTime<Utc>>,
    pub ssl_days_left: Option<i64>,
    pub ssl_issuer: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// A contiguous span during which a check was considered down.
///
/// At most one incident per check has a null `ended_at` at any instant.
/// Incidents are closed exactly once and never reopened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub check_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub cause: String,
    /// Joined from the owning check for display purposes.
    pub check_name: String,
}

impl Incident {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn duration(&self) -> Duration {
        if let Some(secs) = self.duration_seconds {
            return Duration::seconds(secs);
        }
        match self.ended_at {
            Some(ended) => ended - self.started_at,
            None => Utc::now() - self.started_at,
        }
    }

    /// Human-readable downtime, used in notification bodies.
    pub fn duration_string(&self) -> String {
        let secs = self.duration().num_seconds().max(0);
        if secs < 60 {
            format!("{secs}s")
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        }
    }
}

/// One recorded delivery attempt for an incident notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub incident_id: i64,
    pub channel: String,
    pub sent_at: DateTime<Utc>,
    pub success: bool,
    pub error_message: String,
}

/// Uptime and latency statistics over the standard dashboard windows.
///
/// Windows with no samples report 100 % uptime and 0 ms latency.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckStats {
    pub uptime_percent_24h: f64,
    pub uptime_percent_7d: f64,
    pub uptime_percent_30d: f64,
    pub avg_response_ms_24h: i64,
    pub avg_response_ms_7d: i64,
    pub avg_response_ms_30d: i64,
}

/// One hour of rolled-up probe results, produced by the retention sweep
/// before raw results are pruned.
#[derive(Debug, Clone, Serialize)]
pub struct HourlyAggregate {
    pub id: i64,
    pub check_id: i64,
    pub hour: DateTime<Utc>,
    pub total_checks: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub avg_response_ms: i64,
    pub min_response_ms: i64,
    pub max_response_ms: i64,
    pub uptime_percent: f64,
}
