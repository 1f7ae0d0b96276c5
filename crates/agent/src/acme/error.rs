//! ACME error types

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from the protocol collaborator (account, order, challenge, download)
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Client construction failed
    #[error("failed to construct ACME client: {0}")]
    ClientSetup(String),

    /// Account registration failed
    #[error("failed to register ACME account: {0}")]
    AccountCreation(String),

    /// Failed to create certificate order
    #[error("failed to create certificate order: {0}")]
    OrderCreation(String),

    /// No HTTP-01 challenge offered for a domain
    #[error("no HTTP-01 challenge available for domain '{0}'")]
    NoHttp01Challenge(String),

    /// Publishing the challenge artifact failed
    #[error("failed to present challenge for domain '{domain}': {source}")]
    ChallengePresent {
        domain: String,
        #[source]
        source: io::Error,
    },

    /// Challenge validation failed
    #[error("challenge validation failed: {0}")]
    ChallengeValidation(String),

    /// Certificate finalization failed
    #[error("failed to finalize certificate: {0}")]
    Finalization(String),
}

/// Step of the issuance workflow that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuancePhase {
    KeyGeneration,
    ClientSetup,
    Registration,
    Obtain,
}

impl fmt::Display for IssuancePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssuancePhase::KeyGeneration => "key generation",
            IssuancePhase::ClientSetup => "ACME client setup",
            IssuancePhase::Registration => "account registration",
            IssuancePhase::Obtain => "certificate issuance",
        };
        f.write_str(name)
    }
}

/// Issuance failure tagged with the phase it happened in
#[derive(Debug, Error)]
#[error("{phase} failed: {source}")]
pub struct IssuanceError {
    pub phase: IssuancePhase,
    #[source]
    pub source: IssuanceCause,
}

impl IssuanceError {
    pub fn new(phase: IssuancePhase, source: impl Into<IssuanceCause>) -> Self {
        Self {
            phase,
            source: source.into(),
        }
    }
}

/// Underlying cause of an [`IssuanceError`]
#[derive(Debug, Error)]
pub enum IssuanceCause {
    #[error("{0}")]
    KeyGeneration(#[from] rcgen::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors reading or parsing an existing certificate
#[derive(Debug, Error)]
pub enum DecisionError {
    /// File exists but could not be read
    #[error("failed to read certificate {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File is not a PEM-encoded X.509 certificate
    #[error("failed to parse certificate {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Errors persisting certificate material
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to create parent directory
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write, sync or set permissions on the temporary file
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to move the temporary file into place
    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The new chain was installed but its key was not
    #[error(
        "installed new certificate chain at {cert_path} but not its key at {key_path}, \
         the key file does not match the chain: {source}"
    )]
    KeyMismatch {
        cert_path: PathBuf,
        key_path: PathBuf,
        #[source]
        source: Box<StorageError>,
    },
}
