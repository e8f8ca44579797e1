//! Slack and Discord webhook channels.
//!
//! Both senders POST a JSON payload to the configured webhook URL. Slack
//! acknowledges with 200 OK; Discord with 204 No Content. Any other status
//! is treated as a delivery failure so the attempt is logged accordingly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Alert, AlertKind, ChannelSender};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

const DISCORD_RED: u32 = 15158332;
const DISCORD_GREEN: u32 = 3066993;
const DISCORD_YELLOW: u32 = 16776960;

#[derive(Debug, Serialize)]
struct SlackMessage {
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    text: String,
    footer: String,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct DiscordMessage {
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    footer: DiscordFooter,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct DiscordFooter {
    text: String,
}

fn downtime(alert: &Alert) -> String {
    alert
        .incident
        .as_ref()
        .map(|i| i.duration_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub struct SlackSender {
    webhook_url: String,
    client: Client,
}

impl SlackSender {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    fn build_message(&self, alert: &Alert) -> SlackMessage {
        let (color, title, text) = match alert.kind {
            AlertKind::Down => (
                "danger",
                format!("🔴 DOWN: {}", alert.check.name),
                format!("*URL:* {}\n*Error:* {}", alert.check.url, alert.error),
            ),
            AlertKind::Recovery => (
                "good",
                format!("✅ RECOVERED: {}", alert.check.name),
                format!(
                    "*URL:* {}\n*Downtime:* {}",
                    alert.check.url,
                    downtime(alert)
                ),
            ),
            AlertKind::SslExpiry => (
                "warning",
                format!("⚠️ SSL EXPIRING: {}", alert.check.name),
                format!("*URL:* {}\n*Warning:* {}", alert.check.url, alert.error),
            ),
        };

        SlackMessage {
            attachments: vec![SlackAttachment {
                color: color.to_string(),
                title,
                text,
                footer: "Sentinel Uptime Monitor".to_string(),
                ts: alert.timestamp.timestamp(),
            }],
        }
    }
}

#[async_trait]
impl ChannelSender for SlackSender {
    fn channel(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        let message = self.build_message(alert);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("slack webhook returned status {}", response.status());
        }
        Ok(())
    }
}

pub struct DiscordSender {
    webhook_url: String,
    client: Client,
}

impl DiscordSender {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    fn build_message(&self, alert: &Alert) -> DiscordMessage {
        let (color, title, description) = match alert.kind {
            AlertKind::Down => (
                DISCORD_RED,
                format!("🔴 DOWN: {}", alert.check.name),
                format!("**URL:** {}\n**Error:** {}", alert.check.url, alert.error),
            ),
            AlertKind::Recovery => (
                DISCORD_GREEN,
                format!("✅ RECOVERED: {}", alert.check.name),
                format!(
                    "**URL:** {}\n**Downtime:** {}",
                    alert.check.url,
                    downtime(alert)
                ),
            ),
            AlertKind::SslExpiry => (
                DISCORD_YELLOW,
                format!("⚠️ SSL EXPIRING: {}", alert.check.name),
                format!("**URL:** {}\n**Warning:** {}", alert.check.url, alert.error),
            ),
        };

        DiscordMessage {
            embeds: vec![DiscordEmbed {
                title,
                description,
                color,
                footer: DiscordFooter {
                    text: "Sentinel Uptime Monitor".to_string(),
                },
                timestamp: alert.timestamp.to_rfc3339(),
            }],
        }
    }
}

#[async_trait]
impl ChannelSender for DiscordSender {
    fn channel(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        let message = self.build_message(alert);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await?;

        // Discord returns 204 No Content on success.
        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::NO_CONTENT {
            anyhow::bail!("discord webhook returned status {}", status);
        }
        Ok(())
    }
}
