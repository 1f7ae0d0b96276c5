//! Certpilot configuration
//!
//! Resolves the agent's settings once at startup from environment variables
//! and validates them before any certificate work begins.
//!
//! # Environment
//!
//! | Variable                | Meaning                                  | Default |
//! |-------------------------|------------------------------------------|---------|
//! | `EMAIL`                 | ACME account contact                     | `notmy@mail.com` |
//! | `DOMAIN`                | Primary domain (required)                | - |
//! | `SAN`                   | Comma-separated alternate names          | none |
//! | `CERT_PATH`             | Certificate chain location               | `/etc/ssl/private/fullchain.pem` |
//! | `KEY_PATH`              | Private key location                     | `/etc/ssl/private/key.pem` |
//! | `CA_DIR_URL`            | ACME directory URL                       | Let's Encrypt staging |
//! | `EXPIRY_DAYS_THRESHOLD` | Renew when this many days remain         | `30` |
//! | `CHALLENGE_DIR`         | HTTP-01 token directory                  | nginx challenge root |
//! | `RELOAD_COMMAND`        | Shell command run after a new certificate| `nginx -s reload` |
//!
//! Variables set to an empty string are treated as unset.

mod agent;
mod error;
mod target;

pub use agent::{
    AgentConfig, DEFAULT_CA_DIR_URL, DEFAULT_CERT_PATH, DEFAULT_CHALLENGE_DIR, DEFAULT_EMAIL,
    DEFAULT_EXPIRY_DAYS_THRESHOLD, DEFAULT_KEY_PATH, DEFAULT_RELOAD_COMMAND,
};
pub use error::ConfigError;
pub use target::RenewalTarget;
