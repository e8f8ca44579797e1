//! Verdict processing: turning a stream of probe outcomes into incident
//! lifecycle events.
//!
//! Previous observed status is always derived from the latest persisted
//! result at the moment a verdict is processed, never from a cached field,
//! so a freshly added check starts from a clean `pending` baseline and
//! concurrent readers cannot observe stale state.
//!
//! Failure discipline: a persistence failure aborts the current verdict and
//! is reported. A failure to create or close an incident is logged and the
//! worker carries on. Alert delivery failures are the dispatcher's problem
//! and never block processing.

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, error, warn};

use crate::alerts::AlertManager;
use crate::probe::ProbeResponse;
use crate::storage::models::{Check, CheckResult, Incident, Verdict};
use crate::storage::{Storage, StorageResult};

/// Handles one probe response for a check: persists the result, applies the
/// state-transition rules, and dispatches alerts on open/close.
pub async fn process_result(
    storage: &dyn Storage,
    alerter: &AlertManager,
    check: &Check,
    response: &ProbeResponse,
    consecutive_failures: usize,
) -> anyhow::Result<CheckResult> {
    let verdict = response.verdict(check.expected_status);

    let previous = storage
        .latest_result(check.id)
        .await
        .context("loading previous result")?
        .map(|r| r.verdict);

    let result = CheckResult {
        id: 0,
        check_id: check.id,
        verdict,
        status_code: response.status_code,
        response_time_ms: response.response_time_ms,
        error_message: response.error.clone().unwrap_or_default(),
        ssl_expires_at: response.ssl_expires_at,
        ssl_days_left: response.ssl_days_left,
        ssl_issuer: response.ssl_issuer.clone(),
        checked_at: Utc::now(),
    };
    let result = storage
        .save_result(&result)
        .await
        .context("saving result")?;

    // First result for this check: establish the baseline, nothing fires.
    let Some(previous) = previous else {
        debug!("{}: first result, baseline {}", check.name, verdict);
        return Ok(result);
    };

    match verdict {
        Verdict::Down => {
            match should_open_incident(storage, check.id, consecutive_failures).await {
                Ok(true) => open_incident(storage, alerter, check, &result).await,
                Ok(false) => {}
                Err(e) => error!("{}: checking alert threshold: {e}", check.name),
            }
        }
        Verdict::Up if previous == Verdict::Down => {
            close_incident(storage, alerter, check).await;
        }
        Verdict::Up => {}
    }

    Ok(result)
}

/// The alert-open gate: true iff the last `threshold` results are all down,
/// at least `threshold` results exist, and no incident is currently open.
pub async fn should_open_incident(
    storage: &dyn Storage,
    check_id: i64,
    threshold: usize,
) -> StorageResult<bool> {
    let threshold = threshold.max(1);

    let recent = storage.recent_results(check_id, threshold as i64).await?;
    if recent.len() < threshold {
        return Ok(false);
    }
    if recent.iter().any(|r| r.verdict == Verdict::Up) {
        return Ok(false);
    }

    Ok(storage.active_incident(check_id).await?.is_none())
}

async fn open_incident(
    storage: &dyn Storage,
    alerter: &AlertManager,
    check: &Check,
    result: &CheckResult,
) {
    let incident = Incident {
        id: 0,
        check_id: check.id,
        started_at: Utc::now(),
        ended_at: None,
        duration_seconds: None,
        cause: result.error_message.clone(),
        check_name: check.name.clone(),
    };

    match storage.create_incident(&incident).await {
        Ok(incident) => {
            debug!("{}: opened incident {}", check.name, incident.id);
            if let Err(e) = alerter
                .send_down(check, &incident, &result.error_message)
                .await
            {
                warn!("{}: failed to send down alert: {e:#}", check.name);
            }
        }
        Err(e) => error!("{}: failed to create incident: {e}", check.name),
    }
}

async fn close_incident(storage: &dyn Storage, alerter: &AlertManager, check: &Check) {
    let incident = match storage.active_incident(check.id).await {
        Ok(Some(incident)) => incident,
        Ok(None) => return,
        Err(e) => {
            error!("{}: failed to look up active incident: {e}", check.name);
            return;
        }
    };

    if let Err(e) = storage.close_incident(incident.id, Utc::now()).await {
        error!("{}: failed to close incident {}: {e}", check.name, incident.id);
        return;
    }
    debug!("{}: closed incident {}", check.name, incident.id);

    // Re-read to pick up the computed duration for the notification.
    let incident = match storage.incident(incident.id).await {
        Ok(Some(closed)) => closed,
        _ => incident,
    };

    if let Err(e) = alerter.send_recovery(check, &incident).await {
        warn!("{}: failed to send recovery alert: {e:#}", check.name);
    }
}
