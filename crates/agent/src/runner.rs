//! Renewal workflow
//!
//! start → decision → (renew?) issuance → persistence → activation
//!
//! Every phase runs to completion before the next one starts. The first
//! unrecovered failure ends the run; an external scheduler runs the agent
//! again later, and re-running is always safe.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use certpilot_config::AgentConfig;

use crate::acme::{
    evaluate, ChallengeResponder, CertificateStorage, FileChallengeResponder,
    InstantAcmeConnector, IssuanceError, IssuanceOrchestrator, ProtocolConnector, RenewalDecision,
    StorageError,
};
use crate::reload::{ActivationError, Activator, CommandReloader};

/// Unrecovered failure of a run
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Issuance(#[from] IssuanceError),

    #[error("failed to save certificate: {0}")]
    Storage(#[from] StorageError),

    #[error(
        "new certificate was written to {} but the service reload failed: {source}",
        cert_path.display()
    )]
    Activation {
        cert_path: PathBuf,
        #[source]
        source: ActivationError,
    },
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The installed certificate is kept
    NotDue(RenewalDecision),
    /// A new certificate was written and the service reloaded
    Renewed {
        decision: RenewalDecision,
        domains: Vec<String>,
    },
}

/// One renewal pass over a single certificate
pub struct RenewalAgent<C, A> {
    config: AgentConfig,
    orchestrator: IssuanceOrchestrator<C>,
    storage: CertificateStorage,
    activator: A,
}

impl RenewalAgent<InstantAcmeConnector, CommandReloader> {
    /// Production wiring: instant-acme, on-disk challenges, shell reload.
    pub fn from_config(config: AgentConfig) -> Self {
        let responder = Arc::new(FileChallengeResponder::new(&config.challenge_dir));
        let activator = CommandReloader::new(config.reload_command.clone());
        Self::new(config, InstantAcmeConnector::default(), responder, activator)
    }
}

impl<C: ProtocolConnector, A: Activator> RenewalAgent<C, A> {
    pub fn new(
        config: AgentConfig,
        connector: C,
        responder: Arc<dyn ChallengeResponder>,
        activator: A,
    ) -> Self {
        let storage = CertificateStorage::new(&config.cert_path, &config.key_path);
        Self {
            config,
            orchestrator: IssuanceOrchestrator::new(connector, responder),
            storage,
            activator,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Evaluate the installed certificate.
    ///
    /// An unreadable or corrupt certificate is logged and answered with a
    /// renewal, since issuing a fresh one repairs it.
    pub fn decide(&self) -> RenewalDecision {
        let domains = self.config.domains();
        match evaluate(
            &self.config.cert_path,
            &domains,
            self.config.expiry_days_threshold,
        ) {
            Ok(decision) => decision,
            Err(e) => {
                error!(error = %e, "Failed to inspect existing certificate, renewing it");
                RenewalDecision::unparsable()
            }
        }
    }

    /// Run the whole workflow once.
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        let decision = self.decide();
        if !decision.requires_renewal() {
            info!(decision = %decision, "Certificate is still valid and not due for renewal");
            return Ok(RunOutcome::NotDue(decision));
        }

        let domains = self.config.domains();
        info!(
            certificate = %self.config.target,
            reason = %decision.reason(),
            "Obtaining new certificate"
        );

        let certificate = self
            .orchestrator
            .issue(&self.config.email, &self.config.ca_dir_url, &domains)
            .await?;

        self.storage.save(&certificate)?;

        if let Err(source) = self.activator.activate().await {
            warn!(
                cert_path = %self.storage.cert_path().display(),
                "New certificate is on disk but the service was not reloaded"
            );
            return Err(RunError::Activation {
                cert_path: self.storage.cert_path().to_path_buf(),
                source,
            });
        }

        info!(domains = ?certificate.domains, "Certificate obtained and service reloaded");
        Ok(RunOutcome::Renewed {
            decision,
            domains: certificate.domains,
        })
    }
}

impl<C, A> std::fmt::Debug for RenewalAgent<C, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalAgent")
            .field("target", &self.config.target)
            .field("storage", &self.storage)
            .finish()
    }
}
