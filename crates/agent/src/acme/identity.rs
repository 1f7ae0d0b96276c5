//! Per-run ACME account identity and certificate key

use std::fmt;

use rcgen::{KeyPair, PKCS_ECDSA_P256_SHA256};

/// Who registers with the authority for one run
///
/// The account key itself is generated by the protocol backend during
/// registration, so nothing here is secret. Nothing is persisted; every run
/// registers again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    email: String,
}

impl AccountIdentity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Contact URI sent with the registration
    pub fn contact(&self) -> String {
        format!("mailto:{}", self.email)
    }
}

/// Fresh ECDSA P-256 key for the certificate being requested
///
/// Generated at the start of one issuance; the CSR is signed with it and its
/// PEM encoding is what ends up in the key file.
pub struct CertificateKey {
    key_pair: KeyPair,
}

impl CertificateKey {
    pub fn generate() -> Result<Self, rcgen::Error> {
        Ok(Self {
            key_pair: KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)?,
        })
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// PKCS#8 PEM encoding of the private key
    pub fn to_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }
}

impl fmt::Debug for CertificateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateKey")
            .field("algorithm", &"ECDSA P-256")
            .field("key", &"<redacted>")
            .finish()
    }
}
