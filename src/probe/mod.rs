//! HTTP probe executor
//!
//! Performs one observation of an endpoint: an HTTP GET with a
//! request-scoped timeout, a single retry after a configurable delay, and
//! TLS peer-certificate capture for HTTPS endpoints.
//!
//! Failures never surface as `Err` from [`HttpProber::execute`]; they land
//! in [`ProbeResponse::error`] so the classifier can turn them into a
//! `down` verdict. A non-matching HTTP status is *not* an executor-level
//! error: it is a clean response whose code the classifier rejects.

pub mod tls;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{instrument, trace};

use crate::storage::models::Verdict;

const USER_AGENT: &str = "Sentinel/1.0 (Uptime Monitor)";
const MAX_REDIRECTS: usize = 10;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// One probe request: the URL plus its scheduling parameters.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub url: String,
    pub timeout: Duration,
    pub expected_status: u16,
}

/// The observed outcome of one probe (including its retry).
///
/// `response_time_ms` is always filled and measures the whole probe,
/// DNS/TCP/TLS included; for a retried probe it covers both attempts and
/// the retry sleep. `status_code` is 0 when no HTTP reply arrived.
#[derive(Debug, Clone, Default)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub response_time_ms: u64,
    pub error: Option<String>,
    pub ssl_expires_at: Option<DateTime<Utc>>,
    pub ssl_days_left: Option<i64>,
    pub ssl_issuer: Option<String>,
}

impl ProbeResponse {
    /// Success per the shared classifier policy: no transport error and a
    /// status code equal to the expected one (200 when unset).
    pub fn is_success(&self, expected_status: u16) -> bool {
        if self.error.is_some() {
            return false;
        }
        let expected = if expected_status == 0 {
            200
        } else {
            expected_status
        };
        self.status_code == expected
    }

    pub fn verdict(&self, expected_status: u16) -> Verdict {
        if self.is_success(expected_status) {
            Verdict::Up
        } else {
            Verdict::Down
        }
    }
}

/// Probe executor backed by a shared reqwest client.
///
/// The client follows up to 10 redirects (beyond that the last response is
/// surfaced as-is), requires TLS 1.2 or newer, and records TLS connection
/// info so the peer certificate can be inspected.
pub struct HttpProber {
    client: reqwest::Client,
    retry_delay: Duration,
}

impl HttpProber {
    pub fn new() -> Self {
        Self::with_retry_delay(DEFAULT_RETRY_DELAY)
    }

    /// A retry delay of zero disables the retry entirely.
    pub fn with_retry_delay(retry_delay: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::custom(|attempt| {
                if attempt.previous().len() > MAX_REDIRECTS {
                    attempt.stop()
                } else {
                    attempt.follow()
                }
            }))
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .tls_info(true)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            retry_delay,
        }
    }

    /// Runs one probe, retrying once after `retry_delay` when the first
    /// attempt is not a success.
    #[instrument(skip(self), fields(url = %request.url))]
    pub async fn execute(&self, request: &ProbeRequest) -> ProbeResponse {
        let start = Instant::now();
        let mut response = self.attempt(request).await;

        if !response.is_success(request.expected_status) && !self.retry_delay.is_zero() {
            trace!("probe failed, retrying after {:?}", self.retry_delay);
            tokio::time::sleep(self.retry_delay).await;
            response = self.attempt(request).await;
        }

        response.response_time_ms = start.elapsed().as_millis() as u64;
        response
    }

    async fn attempt(&self, request: &ProbeRequest) -> ProbeResponse {
        let start = Instant::now();
        let result = self
            .client
            .get(&request.url)
            .timeout(request.timeout)
            .send()
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let cert = response
                    .extensions()
                    .get::<reqwest::tls::TlsInfo>()
                    .and_then(|info| info.peer_certificate())
                    .and_then(tls::extract_certificate);

                match cert {
                    Some(cert) => ProbeResponse {
                        status_code,
                        response_time_ms: elapsed_ms,
                        error: None,
                        ssl_expires_at: Some(cert.expires_at),
                        ssl_days_left: Some(cert.days_left),
                        ssl_issuer: Some(cert.issuer),
                    },
                    None => ProbeResponse {
                        status_code,
                        response_time_ms: elapsed_ms,
                        ..Default::default()
                    },
                }
            }
            Err(e) => ProbeResponse {
                status_code: 0,
                response_time_ms: elapsed_ms,
                error: Some(e.to_string()),
                ..Default::default()
            },
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}
