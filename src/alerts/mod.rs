//! Alert dispatch
//!
//! Converts incident transitions into notifications. The dispatcher fans
//! out to every enabled channel sender, records each delivery attempt in
//! the alert log, and enforces the per-incident cooldown so a flapping
//! worker cannot page repeatedly for the same outage.
//!
//! ## Cooldown
//!
//! The most recent *successful* delivery for an incident suppresses further
//! sends within `cooldown_minutes`. Failed deliveries never suppress: the
//! next transition retries. Alerts without an incident (certificate expiry
//! warnings) bypass the cooldown and are not logged.
//!
//! The dispatcher never retries within a single call; retries come from
//! later state-machine transitions.

pub mod email;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, instrument, warn};

use crate::config::AlertsConfig;
use crate::storage::models::{AlertRecord, Check, Incident};
use crate::storage::Storage;

use email::EmailSender;
use webhook::{DiscordSender, SlackSender};

/// What happened: the endpoint went down, recovered, or its certificate is
/// about to expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Down,
    Recovery,
    SslExpiry,
}

/// One notification, handed to every enabled channel sender.
#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: AlertKind,
    pub check: Check,
    pub incident: Option<Incident>,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// A delivery channel. Implementations build their channel-specific payload
/// from the [`Alert`] and perform one delivery attempt.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Stable tag recorded in the alert log (`email`, `slack`, `discord`).
    fn channel(&self) -> &'static str;

    async fn send(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Fans incident transitions out to the configured channels.
pub struct AlertManager {
    config: AlertsConfig,
    storage: Arc<dyn Storage>,
    senders: Vec<Box<dyn ChannelSender>>,
}

impl AlertManager {
    /// Builds the sender list from the configuration. A channel that fails
    /// to initialize is skipped with an error log rather than aborting
    /// startup.
    pub fn new(config: AlertsConfig, storage: Arc<dyn Storage>) -> Self {
        let mut senders: Vec<Box<dyn ChannelSender>> = Vec::new();

        if config.email.enabled {
            match EmailSender::new(config.email.clone()) {
                Ok(sender) => senders.push(Box::new(sender)),
                Err(e) => error!("failed to initialize email sender: {e}"),
            }
        }
        if config.slack.enabled {
            senders.push(Box::new(SlackSender::new(config.slack.webhook_url.clone())));
        }
        if config.discord.enabled {
            senders.push(Box::new(DiscordSender::new(
                config.discord.webhook_url.clone(),
            )));
        }

        Self {
            config,
            storage,
            senders,
        }
    }

    /// Builds a manager with an explicit sender list (used by tests).
    pub fn with_senders(
        config: AlertsConfig,
        storage: Arc<dyn Storage>,
        senders: Vec<Box<dyn ChannelSender>>,
    ) -> Self {
        Self {
            config,
            storage,
            senders,
        }
    }

    #[instrument(skip(self, check, incident), fields(check = %check.name))]
    pub async fn send_down(
        &self,
        check: &Check,
        incident: &Incident,
        error: &str,
    ) -> anyhow::Result<()> {
        self.dispatch(Alert {
            kind: AlertKind::Down,
            check: check.clone(),
            incident: Some(incident.clone()),
            error: error.to_string(),
            timestamp: Utc::now(),
        })
        .await
    }

    #[instrument(skip(self, check, incident), fields(check = %check.name))]
    pub async fn send_recovery(&self, check: &Check, incident: &Incident) -> anyhow::Result<()> {
        if !self.config.recovery_notification {
            return Ok(());
        }

        self.dispatch(Alert {
            kind: AlertKind::Recovery,
            check: check.clone(),
            incident: Some(incident.clone()),
            error: String::new(),
            timestamp: Utc::now(),
        })
        .await
    }

    /// Certificate expiry warning. Disabled unless `ssl_expiry_days` is set.
    #[instrument(skip(self, check), fields(check = %check.name))]
    pub async fn send_ssl_expiry(
        &self,
        check: &Check,
        days_left: i64,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if self.config.ssl_expiry_days == 0 {
            return Ok(());
        }

        self.dispatch(Alert {
            kind: AlertKind::SslExpiry,
            check: check.clone(),
            incident: None,
            error: format!(
                "SSL certificate expires in {} days (on {})",
                days_left,
                expires_at.format("%b %-d, %Y")
            ),
            timestamp: Utc::now(),
        })
        .await
    }

    async fn dispatch(&self, alert: Alert) -> anyhow::Result<()> {
        if !self.should_send(&alert).await {
            debug!("alert suppressed by cooldown");
            return Ok(());
        }

        let mut last_err = None;

        for sender in &self.senders {
            match sender.send(&alert).await {
                Ok(()) => {
                    self.log_attempt(&alert, sender.channel(), true, "").await;
                }
                Err(e) => {
                    warn!("{} delivery failed: {e:#}", sender.channel());
                    self.log_attempt(&alert, sender.channel(), false, &e.to_string())
                        .await;
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn should_send(&self, alert: &Alert) -> bool {
        let Some(incident) = &alert.incident else {
            return true;
        };

        let cooldown = Duration::minutes(self.config.cooldown_minutes as i64);

        match self
            .storage
            .last_alert_for_incident(incident.id, "email")
            .await
        {
            Ok(Some(last)) if last.success => Utc::now() - last.sent_at >= cooldown,
            Ok(_) => true,
            // On a storage error, allow the alert rather than dropping it.
            Err(e) => {
                warn!("cooldown lookup failed: {e}");
                true
            }
        }
    }

    async fn log_attempt(&self, alert: &Alert, channel: &str, success: bool, error: &str) {
        let Some(incident) = &alert.incident else {
            return;
        };

        let record = AlertRecord {
            id: 0,
            incident_id: incident.id,
            channel: channel.to_string(),
            sent_at: Utc::now(),
            success,
            error_message: error.to_string(),
        };

        if let Err(e) = self.storage.log_alert(&record).await {
            warn!("failed to log alert delivery: {e}");
        }
    }
}
