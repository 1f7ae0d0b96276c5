//! Renewal decision engine
//!
//! Inspects the installed certificate and decides whether a new one has to
//! be obtained. A missing certificate is the normal first-run state and is
//! reported as a decision, not an error.

use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

use super::error::DecisionError;

const SECONDS_PER_DAY: i64 = 86_400;

/// Why the engine reached its decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalReason {
    /// No certificate file exists yet
    Absent,
    /// A file exists but could not be read as a certificate
    Unparsable,
    /// The certificate does not cover a required name
    DomainMismatch { domain: String },
    /// Remaining validity is at or below the threshold
    Expiring { days_remaining: i64 },
    /// Remaining validity is above the threshold
    Valid { days_remaining: i64 },
}

impl fmt::Display for RenewalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenewalReason::Absent => write!(f, "absent"),
            RenewalReason::Unparsable => write!(f, "unparsable"),
            RenewalReason::DomainMismatch { domain } => {
                write!(f, "domain mismatch ({})", domain)
            }
            RenewalReason::Expiring { days_remaining } => {
                write!(f, "expiring ({} days remaining)", days_remaining)
            }
            RenewalReason::Valid { days_remaining } => {
                write!(f, "valid ({} days remaining)", days_remaining)
            }
        }
    }
}

/// Outcome of [`evaluate`]: renew or keep, with exactly one reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalDecision {
    reason: RenewalReason,
}

impl RenewalDecision {
    pub fn new(reason: RenewalReason) -> Self {
        Self { reason }
    }

    /// Decision used when the existing certificate is corrupt: issuing a
    /// fresh certificate is always a safe correction.
    pub fn unparsable() -> Self {
        Self::new(RenewalReason::Unparsable)
    }

    pub fn reason(&self) -> &RenewalReason {
        &self.reason
    }

    /// `true` for every reason except [`RenewalReason::Valid`]
    pub fn requires_renewal(&self) -> bool {
        !matches!(self.reason, RenewalReason::Valid { .. })
    }
}

impl fmt::Display for RenewalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = if self.requires_renewal() { "renew" } else { "keep" };
        write!(f, "{}: {}", action, self.reason)
    }
}

/// A name a certificate is valid for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectName {
    Dns(String),
    Ip(IpAddr),
}

/// Read-only view of an installed certificate
#[derive(Debug, Clone)]
pub struct CertificateSnapshot {
    /// Subject alternative names
    pub names: Vec<SubjectName>,
    /// End of the validity period
    pub not_after: DateTime<Utc>,
}

impl CertificateSnapshot {
    /// Load the certificate at `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist. With a chain file
    /// the first certificate (the leaf) is used.
    pub fn load(path: &Path) -> Result<Option<Self>, DecisionError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DecisionError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        Self::from_pem(&data)
            .map(Some)
            .map_err(|message| DecisionError::Parse {
                path: path.to_path_buf(),
                message,
            })
    }

    /// Parse the first PEM certificate in `data`.
    pub fn from_pem(data: &[u8]) -> Result<Self, String> {
        let (_, pem) = parse_x509_pem(data).map_err(|e| format!("invalid PEM: {}", e))?;
        if pem.label != "CERTIFICATE" {
            return Err(format!("expected CERTIFICATE block, found {}", pem.label));
        }

        let (_, cert) = X509Certificate::from_der(&pem.contents)
            .map_err(|e| format!("invalid X.509 certificate: {}", e))?;

        let mut names = Vec::new();
        let san = cert
            .subject_alternative_name()
            .map_err(|e| format!("invalid subject alternative names: {}", e))?;
        if let Some(san) = san {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => names.push(SubjectName::Dns(dns.to_string())),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            names.push(SubjectName::Ip(ip));
                        }
                    }
                    _ => {}
                }
            }
        }

        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| "certificate expiry out of range".to_string())?;

        Ok(Self { names, not_after })
    }

    /// Standard hostname verification against the subject alternative names.
    ///
    /// Matching is case-insensitive; a wildcard may only stand for the whole
    /// left-most label. IP literals only match IP address entries.
    pub fn covers(&self, name: &str) -> bool {
        if let Ok(ip) = name.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
            return self
                .names
                .iter()
                .any(|n| matches!(n, SubjectName::Ip(candidate) if *candidate == ip));
        }

        self.names.iter().any(|n| match n {
            SubjectName::Dns(pattern) => hostname_matches(pattern, name),
            SubjectName::Ip(_) => false,
        })
    }

    /// Whole days until expiry, floored; negative once expired.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.not_after - now).num_seconds().div_euclid(SECONDS_PER_DAY)
    }

    /// Decide against the required names and threshold at instant `now`.
    pub fn decide(
        &self,
        required_domains: &[String],
        expiry_threshold_days: u32,
        now: DateTime<Utc>,
    ) -> RenewalDecision {
        if let Some(domain) = required_domains.iter().find(|d| !self.covers(d)) {
            info!(domain = %domain, "Certificate is not valid for domain");
            return RenewalDecision::new(RenewalReason::DomainMismatch {
                domain: domain.clone(),
            });
        }

        let days_remaining = self.days_remaining(now);
        info!(days_remaining, "Certificate expires in {} days", days_remaining);

        if days_remaining <= i64::from(expiry_threshold_days) {
            RenewalDecision::new(RenewalReason::Expiring { days_remaining })
        } else {
            RenewalDecision::new(RenewalReason::Valid { days_remaining })
        }
    }
}

/// Decide whether the certificate at `certificate_path` must be renewed.
pub fn evaluate(
    certificate_path: &Path,
    required_domains: &[String],
    expiry_threshold_days: u32,
) -> Result<RenewalDecision, DecisionError> {
    evaluate_at(
        certificate_path,
        required_domains,
        expiry_threshold_days,
        Utc::now(),
    )
}

/// [`evaluate`] with an explicit clock.
pub fn evaluate_at(
    certificate_path: &Path,
    required_domains: &[String],
    expiry_threshold_days: u32,
    now: DateTime<Utc>,
) -> Result<RenewalDecision, DecisionError> {
    let Some(snapshot) = CertificateSnapshot::load(certificate_path)? else {
        debug!(
            path = %certificate_path.display(),
            "No certificate exists, needs issuance"
        );
        return Ok(RenewalDecision::new(RenewalReason::Absent));
    };

    let decision = snapshot.decide(required_domains, expiry_threshold_days, now);
    if decision.requires_renewal() {
        debug!(
            expires = %snapshot.not_after,
            threshold_days = expiry_threshold_days,
            reason = %decision.reason(),
            "Certificate needs renewal"
        );
    }
    Ok(decision)
}

fn hostname_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    let host = host.trim_end_matches('.');
    if pattern.is_empty() || host.is_empty() {
        return false;
    }

    let pattern_labels: Vec<&str> = pattern.split('.').collect();
    let host_labels: Vec<&str> = host.split('.').collect();
    if pattern_labels.len() != host_labels.len() {
        return false;
    }

    pattern_labels
        .iter()
        .zip(&host_labels)
        .enumerate()
        .all(|(i, (p, h))| (i == 0 && *p == "*" && !h.is_empty()) || p.eq_ignore_ascii_case(h))
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}
