//! Service activation after a new certificate is written
//!
//! The dependent web server only serves the new certificate once it has been
//! told to reload. The default activator runs a shell command such as
//! `nginx -s reload`.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("failed to start reload command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reload command '{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Makes a dependent service pick up the new certificate
#[async_trait]
pub trait Activator: Send + Sync {
    async fn activate(&self) -> Result<(), ActivationError>;
}

/// Runs a reload command through `sh -c`
#[derive(Debug, Clone)]
pub struct CommandReloader {
    command: String,
}

impl CommandReloader {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl Activator for CommandReloader {
    async fn activate(&self) -> Result<(), ActivationError> {
        info!(command = %self.command, "Running reload command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ActivationError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if output.status.success() {
            info!(command = %self.command, "Reload command completed");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let status = match output.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "no exit code (terminated by signal)".to_string(),
        };
        error!(command = %self.command, status = %status, stderr = %stderr, "Reload command failed");

        Err(ActivationError::Failed {
            command: self.command.clone(),
            status,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let reloader = CommandReloader::new("true");
        reloader.activate().await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_command() {
        let reloader = CommandReloader::new("echo 'nginx: [error] invalid PID' >&2; exit 1");

        let err = reloader.activate().await.unwrap_err();
        match err {
            ActivationError::Failed { status, stderr, .. } => {
                assert_eq!(status, "exit code 1");
                assert_eq!(stderr, "nginx: [error] invalid PID");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let reloader = CommandReloader::new("certpilot-no-such-program-xyz");

        let err = reloader.activate().await.unwrap_err();
        assert!(matches!(err, ActivationError::Failed { ref status, .. } if status == "exit code 127"));
    }

    #[test]
    fn test_command_accessor() {
        assert_eq!(CommandReloader::new("nginx -s reload").command(), "nginx -s reload");
    }
}
