//! Seams between the issuance workflow and the ACME protocol implementation
//!
//! The orchestrator only needs two capabilities from a protocol client:
//! register an identity, and obtain a certificate for an account. The
//! account key pair belongs to the backend; the certificate key is generated
//! by the orchestrator and handed to `obtain`. Keeping
//! them behind traits lets the `instant-acme` backend be swapped (or faked
//! in tests) without touching decision or responder logic.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::challenge::ChallengeResponder;
use super::error::ProtocolError;
use super::identity::{AccountIdentity, CertificateKey};

/// Settings a protocol client is constructed with
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// ACME directory URL of the authority
    pub directory_url: Url,
}

/// A certificate request covering every name at once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObtainRequest {
    /// Names to validate and include, primary first. Repeated names are
    /// requested once.
    pub domains: Vec<String>,
    /// Return the full chain rather than the leaf only
    pub bundle: bool,
}

/// Certificate material returned by the authority
#[derive(Clone)]
pub struct IssuedCertificate {
    /// Names the certificate was issued for, without repeats
    pub domains: Vec<String>,
    /// PEM-encoded certificate chain
    pub certificate: Vec<u8>,
    /// PEM-encoded private key
    pub private_key: Vec<u8>,
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("domains", &self.domains)
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Builds a protocol client with a challenge responder attached
///
/// The responder passed here is the client's only validation method.
pub trait ProtocolConnector: Send + Sync {
    type Client: AcmeProtocol;

    fn connect(
        &self,
        config: &ClientConfig,
        responder: Arc<dyn ChallengeResponder>,
    ) -> Result<Self::Client, ProtocolError>;
}

/// Account registration and certificate issuance
#[async_trait]
pub trait AcmeProtocol: Send + Sync {
    /// Registered account handle
    type Account: Send + Sync;

    /// Create a fresh account for `identity`, sending its contact and
    /// agreeing to the authority's terms of service.
    async fn register(&self, identity: &AccountIdentity) -> Result<Self::Account, ProtocolError>;

    /// Validate every requested name and download one certificate for all
    /// of them, signed over `key`. Either the whole request succeeds or it
    /// fails.
    async fn obtain(
        &self,
        account: &Self::Account,
        request: &ObtainRequest,
        key: &CertificateKey,
    ) -> Result<IssuedCertificate, ProtocolError>;
}
