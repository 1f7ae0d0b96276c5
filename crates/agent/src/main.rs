//! Certpilot - Main entry point
//!
//! Keeps one ACME certificate fresh for a web server that serves HTTP-01
//! challenges from a shared directory.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use certpilot::logging::{init_tracing, LogFormat};
use certpilot::{RenewalAgent, RunOutcome};
use certpilot_config::AgentConfig;

/// Certpilot - unattended ACME certificate renewal
#[derive(Parser, Debug)]
#[command(name = "certpilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format
    #[arg(
        long = "log-format",
        value_enum,
        default_value_t = LogFormat::Text,
        env = "LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Renew the certificate if needed and reload the service (default)
    Run,
    /// Print whether the certificate needs renewal and exit
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = AgentConfig::from_env()
        .inspect_err(|e| error!(error = %e, "Invalid configuration"))
        .context("Failed to load configuration from environment")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Check => check(config),
        Commands::Run => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(run(config))
        }
    }
}

/// Evaluate the installed certificate without contacting the authority
fn check(config: AgentConfig) -> Result<()> {
    let agent = RenewalAgent::from_config(config);
    let decision = agent.decide();
    println!("{}: {}", agent.config().target, decision);
    Ok(())
}

async fn run(config: AgentConfig) -> Result<()> {
    info!(
        certificate = %config.target,
        directory = %config.ca_dir_url,
        "Starting certificate renewal check"
    );
    let agent = RenewalAgent::from_config(config);

    // Dropping the workflow future withdraws any published challenge files
    let result = tokio::select! {
        result = agent.run() => result,
        signal = shutdown_signal() => {
            error!(signal, "Interrupted, renewal aborted");
            bail!("interrupted by {}", signal);
        }
    };

    match result {
        Ok(RunOutcome::NotDue(_)) => {
            info!("No renewal needed");
            Ok(())
        }
        Ok(RunOutcome::Renewed { .. }) => Ok(()),
        Err(e) => {
            error!(error = %e, "Certificate renewal failed");
            Err(e.into())
        }
    }
}

/// Resolves with the name of the first termination signal received
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                return ctrl_c().await;
            }
        };

        tokio::select! {
            name = ctrl_c() => name,
            _ = sigterm.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await
    }
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
