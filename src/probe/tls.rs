//! Peer-certificate introspection for HTTPS probes.
//!
//! The probe client records TLS connection info; this module parses the
//! peer certificate DER with `x509-parser` and extracts the fields the
//! monitor persists alongside each result.

use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

/// Certificate facts attached to a probe result.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub expires_at: DateTime<Utc>,
    /// Whole days until expiry (hours / 24, floored). Negative once expired.
    pub days_left: i64,
    /// Issuer common name, falling back to the first issuer organization.
    pub issuer: String,
}

/// Parses the DER-encoded peer certificate. Returns `None` for malformed
/// input rather than failing the probe.
pub fn extract_certificate(der: &[u8]) -> Option<CertificateInfo> {
    let (_, cert) = parse_x509_certificate(der).ok()?;

    let expires_at = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)?;
    let days_left = (expires_at - Utc::now()).num_hours() / 24;

    let issuer = name_attr(cert.issuer().iter_common_name().next())
        .or_else(|| name_attr(cert.issuer().iter_organization().next()))
        .unwrap_or_default();

    Some(CertificateInfo {
        expires_at,
        days_left,
        issuer,
    })
}

fn name_attr(attr: Option<&AttributeTypeAndValue>) -> Option<String> {
    attr.and_then(|a| a.as_str().ok()).map(String::from)
}
