//! ACME certificate renewal
//!
//! Decides whether the installed certificate must be replaced and, if so,
//! obtains a new one from Let's Encrypt or any compatible CA.
//!
//! # Architecture
//!
//! - [`decision`] - Inspects the installed certificate and yields a [`RenewalDecision`]
//! - [`FileChallengeResponder`] - Publishes HTTP-01 tokens for a co-located web server
//! - [`IssuanceOrchestrator`] - Key generation, client setup, registration and issuance
//! - [`InstantAcmeConnector`] - Protocol backend built on `instant-acme`
//! - [`CertificateStorage`] - Atomic persistence of the chain and key
//!
//! # Challenge Flow
//!
//! When a certificate needs to be obtained or renewed:
//!
//! 1. A fresh certificate key is generated and a new account (with its own
//!    fresh key) is registered with the ACME server
//! 2. One order is created covering every required domain
//! 3. For each domain, the ACME server provides a challenge token
//! 4. [`FileChallengeResponder`] writes the key authorization to `<challenge dir>/<token>`
//! 5. The ACME server fetches `http://<domain>/.well-known/acme-challenge/<token>`
//! 6. Once every domain is validated, the token files are removed
//! 7. A CSR is submitted and the full chain downloaded
//! 8. [`CertificateStorage`] persists the chain and key

pub mod decision;

mod challenge;
mod client;
mod error;
mod identity;
mod orchestrator;
mod protocol;
mod storage;

pub use challenge::{
    challenge_url_path, ChallengeGuard, ChallengeResponder, CleanupOutcome,
    FileChallengeResponder, ACME_CHALLENGE_PREFIX,
};
pub use client::{InstantAcmeClient, InstantAcmeConnector};
pub use decision::{
    evaluate, evaluate_at, CertificateSnapshot, RenewalDecision, RenewalReason, SubjectName,
};
pub use error::{
    DecisionError, IssuanceCause, IssuanceError, IssuancePhase, ProtocolError, StorageError,
};
pub use identity::{AccountIdentity, CertificateKey};
pub use orchestrator::IssuanceOrchestrator;
pub use protocol::{AcmeProtocol, ClientConfig, IssuedCertificate, ObtainRequest, ProtocolConnector};
pub use storage::CertificateStorage;
