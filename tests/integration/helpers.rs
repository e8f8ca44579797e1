//! Shared helpers for the integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sentinel::alerts::{Alert, AlertKind, AlertManager, ChannelSender};
use sentinel::config::AlertsConfig;
use sentinel::probe::HttpProber;
use sentinel::storage::models::{Check, CheckInput};
use sentinel::storage::{MemoryStorage, Storage};

/// A channel sender that records every alert instead of delivering it.
///
/// Registered under the `email` channel tag so the dispatcher's cooldown
/// (which reads the email delivery log) applies to it.
pub struct RecordingSender {
    pub sent: Arc<Mutex<Vec<AlertKind>>>,
}

#[async_trait]
impl ChannelSender for RecordingSender {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(alert.kind);
        Ok(())
    }
}

/// Builds an alert manager with a recording sender and returns the record.
pub fn recording_alerter(
    storage: Arc<MemoryStorage>,
    config: AlertsConfig,
) -> (AlertManager, Arc<Mutex<Vec<AlertKind>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let manager = AlertManager::with_senders(
        config,
        storage,
        vec![Box::new(RecordingSender { sent: sent.clone() })],
    );
    (manager, sent)
}

/// A prober without the retry delay, so each probe is a single attempt.
pub fn fast_prober() -> HttpProber {
    HttpProber::with_retry_delay(Duration::from_millis(0))
}

/// Creates a check against the given URL with a short timeout.
pub async fn create_check(storage: &dyn Storage, name: &str, url: &str) -> Check {
    storage
        .create_check(
            &CheckInput {
                name: name.to_string(),
                url: url.to_string(),
                interval_seconds: 3600,
                timeout_seconds: 2,
                ..Default::default()
            }
            .into_check(),
        )
        .await
        .unwrap()
}

/// Polls `condition` until it returns true or the deadline passes.
pub async fn wait_for<F, Fut>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
