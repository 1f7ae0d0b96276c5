//! Shared fixtures for workflow tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use certpilot::acme::{
    AccountIdentity, AcmeProtocol, CertificateKey, ChallengeGuard, ChallengeResponder,
    ClientConfig, IssuedCertificate, ObtainRequest, ProtocolConnector, ProtocolError,
};
use certpilot::{ActivationError, Activator};
use certpilot_config::AgentConfig;

/// Self-signed PEM certificate for `names` over `key_pair`, expiring
/// `valid_days` (plus half a day) from the real clock
pub fn certificate_pem(
    names: &[String],
    valid_days: i64,
    key_pair: &rcgen::KeyPair,
) -> String {
    let mut params = rcgen::CertificateParams::new(names.to_vec()).unwrap();
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::days(1);
    params.not_after = now + time::Duration::days(valid_days) + time::Duration::hours(12);
    params.self_signed(key_pair).unwrap().pem()
}

pub fn write_certificate(path: &Path, names: &[&str], valid_days: i64) {
    let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    let key_pair = rcgen::KeyPair::generate().unwrap();
    std::fs::write(path, certificate_pem(&names, valid_days, &key_pair)).unwrap();
}

/// Scratch layout for one agent run
pub struct Sandbox {
    pub dir: tempfile::TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: tempfile::TempDir::new().unwrap(),
        }
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.path().join("ssl/fullchain.pem")
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.path().join("ssl/key.pem")
    }

    pub fn challenge_dir(&self) -> PathBuf {
        self.dir.path().join("challenge")
    }

    /// Configuration for `example.com` plus two alternates, with overrides
    pub fn config(&self, overrides: &[(&str, &str)]) -> AgentConfig {
        let mut vars: Vec<(String, String)> = vec![
            ("EMAIL".into(), "admin@example.com".into()),
            ("DOMAIN".into(), "example.com".into()),
            ("SAN".into(), "www.example.com, api.example.com".into()),
            ("CERT_PATH".into(), self.cert_path().display().to_string()),
            ("KEY_PATH".into(), self.key_path().display().to_string()),
            ("CA_DIR_URL".into(), "https://acme.test/directory".into()),
            ("CHALLENGE_DIR".into(), self.challenge_dir().display().to_string()),
            ("RELOAD_COMMAND".into(), "true".into()),
        ];
        for (key, value) in overrides {
            vars.retain(|(k, _)| k != key);
            vars.push((key.to_string(), value.to_string()));
        }
        AgentConfig::from_vars(vars).unwrap()
    }

    pub fn leftover_challenges(&self) -> usize {
        match std::fs::read_dir(self.challenge_dir()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

/// How a [`FakeClient`] behaves once challenges are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Issue a 90-day certificate
    Issue,
    /// Reject validation
    Reject,
    /// Never finish validating
    Hang,
}

/// Records every call and issues self-signed certificates
pub struct FakeConnector {
    pub authority: Authority,
    pub connects: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<ObtainRequest>>>,
}

impl FakeConnector {
    pub fn new(authority: Authority) -> Self {
        Self {
            authority,
            connects: Arc::default(),
            requests: Arc::default(),
        }
    }
}

pub struct FakeClient {
    authority: Authority,
    responder: Arc<dyn ChallengeResponder>,
    requests: Arc<Mutex<Vec<ObtainRequest>>>,
}

impl ProtocolConnector for FakeConnector {
    type Client = FakeClient;

    fn connect(
        &self,
        _config: &ClientConfig,
        responder: Arc<dyn ChallengeResponder>,
    ) -> Result<FakeClient, ProtocolError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakeClient {
            authority: self.authority,
            responder,
            requests: self.requests.clone(),
        })
    }
}

#[async_trait]
impl AcmeProtocol for FakeClient {
    type Account = ();

    async fn register(&self, _identity: &AccountIdentity) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn obtain(
        &self,
        _account: &(),
        request: &ObtainRequest,
        key: &CertificateKey,
    ) -> Result<IssuedCertificate, ProtocolError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut guard = ChallengeGuard::new(self.responder.clone());
        for (i, domain) in request.domains.iter().enumerate() {
            let token = format!("tok{}", i);
            guard
                .present(domain, &token, &format!("{}.proof", token))
                .map_err(|source| ProtocolError::ChallengePresent {
                    domain: domain.clone(),
                    source,
                })?;
        }

        match self.authority {
            Authority::Hang => std::future::pending::<()>().await,
            Authority::Reject => {
                guard.cleanup_all();
                return Err(ProtocolError::ChallengeValidation(
                    "urn:ietf:params:acme:error:unauthorized".to_string(),
                ));
            }
            Authority::Issue => guard.cleanup_all(),
        }

        let cert = certificate_pem(&request.domains, 90, key.key_pair());
        Ok(IssuedCertificate {
            domains: request.domains.clone(),
            certificate: cert.into_bytes(),
            private_key: key.to_pem().into_bytes(),
        })
    }
}

/// Counts activations, optionally failing them
#[derive(Clone, Default)]
pub struct CountingActivator {
    pub calls: Arc<AtomicUsize>,
    pub fail: bool,
}

impl CountingActivator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Activator for CountingActivator {
    async fn activate(&self) -> Result<(), ActivationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ActivationError::Failed {
                command: "nginx -s reload".to_string(),
                status: "exit code 1".to_string(),
                stderr: "nginx: [error] invalid PID".to_string(),
            });
        }
        Ok(())
    }
}
