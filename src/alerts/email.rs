//! SMTP delivery channel.
//!
//! Builds a plain-text RFC 5322 message and hands it to an async lettre
//! transport. `smtp_tls` selects implicit TLS from the first byte; otherwise
//! the connection is upgraded with STARTTLS. Credentials, when configured,
//! use SMTP AUTH.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;

use super::{Alert, AlertKind, ChannelSender};

pub struct EmailSender {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSender {
    pub fn new(config: EmailConfig) -> anyhow::Result<Self> {
        let builder = if config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        };

        let mut builder = builder.port(config.smtp_port);
        if !config.smtp_user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }

    fn build_email(&self, alert: &Alert) -> (String, String) {
        let time = alert.timestamp.format("%a, %d %b %Y %H:%M:%S UTC");

        match alert.kind {
            AlertKind::Down => (
                format!("[SENTINEL] DOWN: {}", alert.check.name),
                format!(
                    "Service: {}\nURL: {}\nStatus: DOWN\nTime: {}\nError: {}\n\n--\nSentinel Uptime Monitor",
                    alert.check.name, alert.check.url, time, alert.error
                ),
            ),
            AlertKind::Recovery => {
                let downtime = alert
                    .incident
                    .as_ref()
                    .map(|i| i.duration_string())
                    .unwrap_or_else(|| "unknown".to_string());
                (
                    format!("[SENTINEL] RECOVERED: {}", alert.check.name),
                    format!(
                        "Service: {}\nURL: {}\nStatus: UP\nTime: {}\nDowntime: {}\n\n--\nSentinel Uptime Monitor",
                        alert.check.name, alert.check.url, time, downtime
                    ),
                )
            }
            AlertKind::SslExpiry => (
                format!("[SENTINEL] SSL EXPIRING: {}", alert.check.name),
                format!(
                    "Service: {}\nURL: {}\nTime: {}\nWarning: {}\n\n--\nSentinel Uptime Monitor",
                    alert.check.name, alert.check.url, time, alert.error
                ),
            ),
        }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        let (subject, body) = self.build_email(alert);

        let mut builder = Message::builder()
            .from(self.config.from_address.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for to in &self.config.to_addresses {
            builder = builder.to(to.parse()?);
        }

        let message = builder.body(body)?;
        self.transport.send(message).await?;
        Ok(())
    }
}
