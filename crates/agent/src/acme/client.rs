//! ACME protocol backend on top of instant-acme
//!
//! Drives one order per issuance:
//! - Account registration with a fresh account key and the run's contact
//! - HTTP-01 challenge presentation through the attached responder
//! - Order polling until the authority has validated every name
//! - CSR submission and chain download

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use instant_acme::{
    Account, AccountBuilder, AuthorizationStatus, BodyWrapper, BytesResponse, ChallengeType,
    HttpClient, Identifier, NewAccount, NewOrder, Order, OrderStatus,
};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::challenge::{challenge_url_path, ChallengeGuard, ChallengeResponder};
use super::error::ProtocolError;
use super::identity::{AccountIdentity, CertificateKey};
use super::protocol::{AcmeProtocol, ClientConfig, IssuedCertificate, ObtainRequest, ProtocolConnector};

/// Interval between order status checks
const ORDER_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Marker closing one PEM certificate block
const PEM_CERT_END: &str = "-----END CERTIFICATE-----";

/// Shared [`HttpClient`] handed to each account builder
struct SharedHttpClient(Arc<dyn HttpClient>);

impl HttpClient for SharedHttpClient {
    fn request(
        &self,
        req: http::Request<BodyWrapper<bytes::Bytes>>,
    ) -> Pin<Box<dyn Future<Output = Result<BytesResponse, instant_acme::Error>> + Send>> {
        self.0.request(req)
    }
}

/// Builds [`InstantAcmeClient`]s
///
/// By default requests go through instant-acme's own hyper/rustls client.
#[derive(Clone, Default)]
pub struct InstantAcmeConnector {
    http: Option<Arc<dyn HttpClient>>,
}

impl InstantAcmeConnector {
    /// Send every ACME request through `http`
    pub fn with_http_client(http: Arc<dyn HttpClient>) -> Self {
        Self { http: Some(http) }
    }
}

impl std::fmt::Debug for InstantAcmeConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstantAcmeConnector")
            .field("custom_http", &self.http.is_some())
            .finish()
    }
}

impl ProtocolConnector for InstantAcmeConnector {
    type Client = InstantAcmeClient;

    fn connect(
        &self,
        config: &ClientConfig,
        responder: Arc<dyn ChallengeResponder>,
    ) -> Result<Self::Client, ProtocolError> {
        match config.directory_url.scheme() {
            "https" | "http" => {}
            other => {
                return Err(ProtocolError::ClientSetup(format!(
                    "unsupported directory URL scheme '{}'",
                    other
                )))
            }
        }

        debug!(directory = %config.directory_url, "Constructed ACME client");
        Ok(InstantAcmeClient {
            directory_url: config.directory_url.clone(),
            responder,
            poll_interval: ORDER_POLL_INTERVAL,
            http: self.http.clone(),
        })
    }
}

/// ACME client bound to one directory, validating over HTTP-01 only
pub struct InstantAcmeClient {
    directory_url: Url,
    responder: Arc<dyn ChallengeResponder>,
    poll_interval: Duration,
    http: Option<Arc<dyn HttpClient>>,
}

impl InstantAcmeClient {
    fn account_builder(&self) -> Result<AccountBuilder, ProtocolError> {
        match &self.http {
            Some(http) => Ok(Account::builder_with_http(Box::new(SharedHttpClient(
                Arc::clone(http),
            )))),
            None => Account::builder().map_err(|e| ProtocolError::ClientSetup(e.to_string())),
        }
    }

    /// Present every pending HTTP-01 challenge and tell the authority it
    /// can validate.
    async fn present_challenges(
        &self,
        order: &mut Order,
        guard: &mut ChallengeGuard,
    ) -> Result<(), ProtocolError> {
        let mut authorizations = order.authorizations();

        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(|e| {
                ProtocolError::OrderCreation(format!("failed to get authorization: {}", e))
            })?;

            let domain = match &authz.identifier().identifier {
                Identifier::Dns(domain) => domain.clone(),
                _ => continue,
            };

            debug!(domain = %domain, status = ?authz.status, "Processing authorization");

            if authz.status == AuthorizationStatus::Valid {
                debug!(domain = %domain, "Authorization already valid");
                continue;
            }

            let mut challenge = authz
                .challenge(ChallengeType::Http01)
                .ok_or_else(|| ProtocolError::NoHttp01Challenge(domain.clone()))?;

            let key_authorization = challenge.key_authorization();
            let token = challenge.token.clone();

            guard
                .present(&domain, &token, key_authorization.as_str())
                .map_err(|source| ProtocolError::ChallengePresent {
                    domain: domain.clone(),
                    source,
                })?;

            info!(
                domain = %domain,
                path = %challenge_url_path(&token),
                "Presented HTTP-01 challenge, notifying ACME server"
            );

            challenge.set_ready().await.map_err(|e| {
                ProtocolError::ChallengeValidation(format!(
                    "failed to set challenge ready for '{}': {}",
                    domain, e
                ))
            })?;
        }

        Ok(())
    }

    /// Poll until every authorization is settled.
    ///
    /// There is no deadline here; the caller bounds the run.
    async fn wait_for_order_ready(&self, order: &mut Order) -> Result<(), ProtocolError> {
        loop {
            let state = order.refresh().await.map_err(|e| {
                ProtocolError::ChallengeValidation(format!("failed to refresh order: {}", e))
            })?;

            match state.status {
                OrderStatus::Ready => {
                    info!("Order is ready for finalization");
                    return Ok(());
                }
                OrderStatus::Valid => {
                    info!("Order is already valid");
                    return Ok(());
                }
                OrderStatus::Invalid => {
                    let detail = state
                        .error
                        .as_ref()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "no problem detail".to_string());
                    error!(detail = %detail, "Order became invalid");
                    return Err(ProtocolError::ChallengeValidation(format!(
                        "order became invalid: {}",
                        detail
                    )));
                }
                OrderStatus::Pending | OrderStatus::Processing => {
                    trace!(status = ?state.status, "Order not ready yet, waiting");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Submit a CSR for `domains` signed with `key` and download the issued
    /// chain.
    async fn finalize_order(
        &self,
        order: &mut Order,
        domains: &[String],
        key: &CertificateKey,
    ) -> Result<String, ProtocolError> {
        info!("Finalizing certificate order");

        let mut params = rcgen::CertificateParams::new(domains.to_vec()).map_err(|e| {
            ProtocolError::Finalization(format!("failed to create CSR params: {}", e))
        })?;
        params.distinguished_name = rcgen::DistinguishedName::new();

        let csr = params
            .serialize_request(key.key_pair())
            .map_err(|e| ProtocolError::Finalization(format!("failed to serialize CSR: {}", e)))?;
        let csr = csr.der().to_vec();

        order
            .finalize_csr(&csr)
            .await
            .map_err(|e| ProtocolError::Finalization(format!("failed to finalize order: {}", e)))?;

        let cert_chain = loop {
            let state = order.refresh().await.map_err(|e| {
                ProtocolError::Finalization(format!("failed to refresh order: {}", e))
            })?;

            match state.status {
                OrderStatus::Valid => {
                    let cert_chain = order.certificate().await.map_err(|e| {
                        ProtocolError::Finalization(format!("failed to get certificate: {}", e))
                    })?;
                    break cert_chain.ok_or_else(|| {
                        ProtocolError::Finalization("no certificate in response".to_string())
                    })?;
                }
                OrderStatus::Invalid => {
                    return Err(ProtocolError::Finalization(
                        "order became invalid".to_string(),
                    ));
                }
                _ => {
                    trace!(status = ?state.status, "Certificate not issued yet, waiting");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        };

        Ok(cert_chain)
    }
}

#[async_trait]
impl AcmeProtocol for InstantAcmeClient {
    type Account = Account;

    async fn register(&self, identity: &AccountIdentity) -> Result<Account, ProtocolError> {
        info!(
            email = %identity.email(),
            directory = %self.directory_url,
            "Registering ACME account"
        );

        // A new P-256 account key is generated for every registration and
        // dropped with the returned account.
        let contact = identity.contact();
        let (account, _credentials) = self
            .account_builder()?
            .create(
                &NewAccount {
                    contact: &[&contact],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                self.directory_url.to_string(),
                None,
            )
            .await
            .map_err(|e| ProtocolError::AccountCreation(e.to_string()))?;

        info!(account = %account.id(), "ACME account registered");
        Ok(account)
    }

    async fn obtain(
        &self,
        account: &Account,
        request: &ObtainRequest,
        key: &CertificateKey,
    ) -> Result<IssuedCertificate, ProtocolError> {
        let domains = unique_domains(&request.domains);
        if domains.len() < request.domains.len() {
            warn!(
                requested = ?request.domains,
                ordered = ?domains,
                "Repeated domain names are requested once"
            );
        }

        let identifiers: Vec<Identifier> =
            domains.iter().map(|d| Identifier::Dns(d.clone())).collect();

        info!(domains = ?domains, "Creating certificate order");

        let mut order = account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| ProtocolError::OrderCreation(e.to_string()))?;

        // Artifacts are withdrawn once validation has been attempted, whatever
        // the outcome; dropping the guard on cancellation does the same.
        let mut guard = ChallengeGuard::new(self.responder.clone());
        let validated = match self.present_challenges(&mut order, &mut guard).await {
            Ok(()) => self.wait_for_order_ready(&mut order).await,
            Err(e) => Err(e),
        };
        guard.cleanup_all();
        validated?;

        let cert_chain = self.finalize_order(&mut order, &domains, key).await?;

        let certificate = if request.bundle {
            cert_chain
        } else {
            leaf_only(&cert_chain).to_string()
        };

        info!(domains = ?domains, "Certificate issued successfully");

        Ok(IssuedCertificate {
            domains,
            certificate: certificate.into_bytes(),
            private_key: key.to_pem().into_bytes(),
        })
    }
}

impl std::fmt::Debug for InstantAcmeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstantAcmeClient")
            .field("directory_url", &self.directory_url.as_str())
            .field("responder", &self.responder)
            .field("custom_http", &self.http.is_some())
            .finish()
    }
}

/// `domains` without repeats, first spelling and order kept. DNS names
/// compare case-insensitively.
fn unique_domains(domains: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    domains
        .iter()
        .filter(|d| seen.insert(d.to_ascii_lowercase()))
        .cloned()
        .collect()
}

/// First certificate of a PEM chain, including its trailing newline
fn leaf_only(chain: &str) -> &str {
    match chain.find(PEM_CERT_END) {
        Some(idx) => {
            let end = idx + PEM_CERT_END.len();
            let end = if chain[end..].starts_with("\r\n") {
                end + 2
            } else if chain[end..].starts_with('\n') {
                end + 1
            } else {
                end
            };
            &chain[..end]
        }
        None => chain,
    }
}
