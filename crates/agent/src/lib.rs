//! Certpilot - unattended ACME certificate renewal
//!
//! Run once per schedule tick (cron, systemd timer). Each run checks the
//! installed certificate and, when it is missing, expiring or no longer
//! covers every configured name, obtains a new one over HTTP-01, writes it
//! to disk and reloads the web server.
//!
//! ```no_run
//! use certpilot::RenewalAgent;
//! use certpilot_config::AgentConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let agent = RenewalAgent::from_config(AgentConfig::from_env()?);
//! let outcome = agent.run().await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod acme;
pub mod logging;
pub mod reload;
pub mod runner;

pub use acme::{RenewalDecision, RenewalReason};
pub use reload::{ActivationError, Activator, CommandReloader};
pub use runner::{RenewalAgent, RunError, RunOutcome};
