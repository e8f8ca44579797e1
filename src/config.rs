//! YAML configuration with environment overrides.
//!
//! A missing config file is not an error; defaults apply. Environment
//! variables prefixed `SENTINEL_` override individual fields after the file
//! is parsed, and the result is validated before the engine starts.

use std::time::Duration;

use serde::Deserialize;
use tracing::trace;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub alerts: AlertsConfig,
    pub retention: RetentionConfig,
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub consecutive_failures: usize,
    pub recovery_notification: bool,
    pub cooldown_minutes: u32,
    /// Days-before-expiry threshold for certificate warnings; 0 disables.
    pub ssl_expiry_days: i64,
    pub email: EmailConfig,
    pub slack: WebhookChannelConfig,
    pub discord: WebhookChannelConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    /// true: implicit TLS from the first byte; false: STARTTLS upgrade.
    pub smtp_tls: bool,
    pub from_address: String,
    pub to_addresses: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookChannelConfig {
    pub enabled: bool,
    pub webhook_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub results_days: i64,
    pub aggregates_days: i64,
}

/// One check from the `checks:` list. Interval and timeout are duration
/// strings (`"60s"`, `"5m"`, `"1h"`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub name: String,
    pub url: String,
    pub interval: String,
    pub timeout: String,
    pub expected_status: u16,
    pub enabled: Option<bool>,
    pub tags: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            alerts: AlertsConfig::default(),
            retention: RetentionConfig::default(),
            checks: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            base_url: String::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./sentinel.db".to_string(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            consecutive_failures: 2,
            recovery_notification: true,
            cooldown_minutes: 5,
            ssl_expiry_days: 0,
            email: EmailConfig::default(),
            slack: WebhookChannelConfig::default(),
            discord: WebhookChannelConfig::default(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_password: String::new(),
            smtp_tls: true,
            from_address: String::new(),
            to_addresses: Vec::new(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            results_days: 7,
            aggregates_days: 90,
        }
    }
}

impl Config {
    /// Loads the file at `path`; a missing file yields the defaults.
    pub fn load(path: &str) -> anyhow::Result<Config> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Config::default());
            }
            Err(e) => return Err(anyhow::anyhow!("reading config file: {e}")),
        };

        let config: Config =
            serde_yaml::from_str(&contents).map_err(|e| anyhow::anyhow!("parsing config: {e}"))?;
        trace!("loaded config: {config:?}");
        Ok(config)
    }

    /// Loads, applies `SENTINEL_*` environment overrides, and validates.
    pub fn load_with_env(path: &str) -> anyhow::Result<Config> {
        let mut config = Config::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SENTINEL_HOST") {
            self.server.host = v;
        }
        if let Some(port) = env_parsed("SENTINEL_PORT") {
            self.server.port = port;
        }
        if let Ok(v) = std::env::var("SENTINEL_BASE_URL") {
            self.server.base_url = v;
        }
        if let Ok(v) = std::env::var("SENTINEL_DB_PATH") {
            self.database.path = v;
        }
        if let Ok(v) = std::env::var("SENTINEL_SMTP_HOST") {
            self.alerts.email.smtp_host = v;
        }
        if let Some(port) = env_parsed("SENTINEL_SMTP_PORT") {
            self.alerts.email.smtp_port = port;
        }
        if let Ok(v) = std::env::var("SENTINEL_SMTP_USER") {
            self.alerts.email.smtp_user = v;
        }
        if let Ok(v) = std::env::var("SENTINEL_SMTP_PASSWORD") {
            self.alerts.email.smtp_password = v;
        }
        if let Ok(v) = std::env::var("SENTINEL_SMTP_FROM") {
            self.alerts.email.from_address = v;
        }
        if let Ok(v) = std::env::var("SENTINEL_SMTP_TO") {
            self.alerts.email.to_addresses =
                v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = std::env::var("SENTINEL_EMAIL_ENABLED") {
            self.alerts.email.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("SENTINEL_SLACK_WEBHOOK_URL") {
            self.alerts.slack.webhook_url = v;
            self.alerts.slack.enabled = true;
        }
        if let Ok(v) = std::env::var("SENTINEL_DISCORD_WEBHOOK_URL") {
            self.alerts.discord.webhook_url = v;
            self.alerts.discord.enabled = true;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("invalid port: {}", self.server.port);
        }
        if self.database.path.is_empty() {
            anyhow::bail!("database path is required");
        }
        if self.alerts.consecutive_failures < 1 {
            anyhow::bail!("consecutive_failures must be at least 1");
        }

        if self.alerts.email.enabled {
            if self.alerts.email.smtp_host.is_empty() {
                anyhow::bail!("smtp_host is required when email is enabled");
            }
            if self.alerts.email.smtp_port == 0 {
                anyhow::bail!("invalid smtp_port: {}", self.alerts.email.smtp_port);
            }
            if self.alerts.email.from_address.is_empty() {
                anyhow::bail!("from_address is required when email is enabled");
            }
            if self.alerts.email.to_addresses.is_empty() {
                anyhow::bail!("to_addresses is required when email is enabled");
            }
        }
        if self.alerts.slack.enabled && self.alerts.slack.webhook_url.is_empty() {
            anyhow::bail!("webhook_url is required when slack is enabled");
        }
        if self.alerts.discord.enabled && self.alerts.discord.webhook_url.is_empty() {
            anyhow::bail!("webhook_url is required when discord is enabled");
        }

        for (i, check) in self.checks.iter().enumerate() {
            if check.name.is_empty() {
                anyhow::bail!("check[{i}]: name is required");
            }
            if check.url.is_empty() {
                anyhow::bail!("check[{i}]: url is required");
            }
            if !check.interval.is_empty() && parse_duration(&check.interval).is_none() {
                anyhow::bail!("check[{i}]: invalid interval {:?}", check.interval);
            }
            if !check.timeout.is_empty() && parse_duration(&check.timeout).is_none() {
                anyhow::bail!("check[{i}]: invalid timeout {:?}", check.timeout);
            }
        }

        if self.retention.results_days < 1 {
            anyhow::bail!("results_days must be at least 1");
        }

        Ok(())
    }
}

impl CheckConfig {
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(60))
    }

    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn expected_status(&self) -> u16 {
        if self.expected_status == 0 {
            200
        } else {
            self.expected_status
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Parses duration strings of the form `500ms`, `30s`, `5m`, `1h`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (value, multiplier_ms) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1u64)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1000)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60 * 1000)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3600 * 1000)
    } else {
        return None;
    };

    let value: u64 = value.trim().parse().ok()?;
    Some(Duration::from_millis(value * multiplier_ms))
}
