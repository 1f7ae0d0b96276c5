//! Agent configuration resolved from the environment

use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;
use url::Url;
use validator::Validate;

use crate::error::ConfigError;
use crate::target::RenewalTarget;

/// Contact used when `EMAIL` is not set
pub const DEFAULT_EMAIL: &str = "notmy@mail.com";
/// Certificate chain location
pub const DEFAULT_CERT_PATH: &str = "/etc/ssl/private/fullchain.pem";
/// Private key location
pub const DEFAULT_KEY_PATH: &str = "/etc/ssl/private/key.pem";
/// Let's Encrypt staging directory
pub const DEFAULT_CA_DIR_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";
/// Renew once this many days (or fewer) remain
pub const DEFAULT_EXPIRY_DAYS_THRESHOLD: u32 = 30;
/// Directory served by the co-located web server at `/.well-known/acme-challenge/`
pub const DEFAULT_CHALLENGE_DIR: &str = "/usr/share/nginx/challenge/.well-known/acme-challenge";
/// Command that makes the web server pick up the new certificate
pub const DEFAULT_RELOAD_COMMAND: &str = "nginx -s reload";

/// Raw environment view; every variable is optional at this stage.
#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    email: Option<String>,
    domain: Option<String>,
    san: Option<String>,
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
    ca_dir_url: Option<String>,
    expiry_days_threshold: Option<u32>,
    challenge_dir: Option<PathBuf>,
    reload_command: Option<String>,
}

/// Fully resolved agent configuration
#[derive(Debug, Clone, Validate)]
pub struct AgentConfig {
    /// ACME account contact email
    #[validate(email)]
    pub email: String,

    /// Names the certificate must cover
    pub target: RenewalTarget,

    /// Where the certificate chain lives
    pub cert_path: PathBuf,

    /// Where the private key lives
    pub key_path: PathBuf,

    /// ACME directory URL
    pub ca_dir_url: Url,

    /// Renew when the remaining whole days are at or below this value
    pub expiry_days_threshold: u32,

    /// Directory that receives HTTP-01 token files
    pub challenge_dir: PathBuf,

    /// Shell command run after a new certificate is written
    #[validate(length(min = 1))]
    pub reload_command: String,
}

impl AgentConfig {
    /// Resolve the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Resolve the configuration from an explicit set of variables.
    ///
    /// Empty values are treated as unset, matching how operators clear a
    /// variable in container manifests.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: RawEnv = envy::from_iter(vars.into_iter().filter(|(_, v)| !v.is_empty()))?;

        let domain = raw.domain.ok_or(ConfigError::MissingDomain)?;
        let alternates = raw
            .san
            .as_deref()
            .map(RenewalTarget::parse_alternates)
            .unwrap_or_default();
        let target = RenewalTarget::new(domain, alternates)?;

        let ca_dir_url = raw
            .ca_dir_url
            .unwrap_or_else(|| DEFAULT_CA_DIR_URL.to_string());
        let ca_dir_url = parse_directory_url(&ca_dir_url)?;

        let config = Self {
            email: raw.email.unwrap_or_else(|| DEFAULT_EMAIL.to_string()),
            target,
            cert_path: raw
                .cert_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CERT_PATH)),
            key_path: raw.key_path.unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_PATH)),
            ca_dir_url,
            expiry_days_threshold: raw
                .expiry_days_threshold
                .unwrap_or(DEFAULT_EXPIRY_DAYS_THRESHOLD),
            challenge_dir: raw
                .challenge_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHALLENGE_DIR)),
            reload_command: raw
                .reload_command
                .unwrap_or_else(|| DEFAULT_RELOAD_COMMAND.to_string()),
        };

        config.validate()?;

        debug!(
            certificate = %config.target,
            cert_path = %config.cert_path.display(),
            key_path = %config.key_path.display(),
            directory = %config.ca_dir_url,
            threshold_days = config.expiry_days_threshold,
            "Resolved agent configuration"
        );

        Ok(config)
    }

    /// All names the certificate must cover, primary first.
    pub fn domains(&self) -> Vec<String> {
        self.target.domains()
    }
}

fn parse_directory_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidDirectoryUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(ConfigError::InvalidDirectoryUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
