//! HTTP-01 ACME challenge responder
//!
//! Publishes key authorizations as files so a co-located web server can serve
//! them at `/.well-known/acme-challenge/<token>`. The agent and the web
//! server share nothing but the challenge directory.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace, warn};

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Successful outcomes of removing a challenge artifact
///
/// A missing artifact counts as success so that cleanup never fails a run
/// because an earlier attempt or an external process already removed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The artifact existed and was deleted
    Removed,
    /// There was nothing to delete
    AlreadyAbsent,
}

/// Domain-validation method driven by the protocol client
///
/// Both operations are called by the ACME backend while an order is being
/// validated, never directly by application code.
pub trait ChallengeResponder: Send + Sync + fmt::Debug {
    /// Make `proof` retrievable for `token` before the authority is asked to
    /// validate `domain`.
    fn present(&self, domain: &str, token: &str, proof: &str) -> io::Result<()>;

    /// Withdraw the artifact for `token` once validation was attempted.
    fn cleanup(&self, domain: &str, token: &str, proof: &str) -> io::Result<CleanupOutcome>;
}

/// Writes one file per token under a fixed base directory
#[derive(Debug, Clone)]
pub struct FileChallengeResponder {
    base_path: PathBuf,
}

impl FileChallengeResponder {
    /// Create a responder rooted at `base_path`.
    ///
    /// The directory is created lazily on the first `present`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Filesystem location of the artifact for `token`
    pub fn artifact_path(&self, token: &str) -> io::Result<PathBuf> {
        check_token(token)?;
        Ok(self.base_path.join(token))
    }

    fn ensure_base_dir(&self) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder.create(&self.base_path)
    }
}

impl ChallengeResponder for FileChallengeResponder {
    fn present(&self, domain: &str, token: &str, proof: &str) -> io::Result<()> {
        let path = self.artifact_path(token)?;
        self.ensure_base_dir()?;

        fs::write(&path, proof)?;

        // Readable by the web server regardless of our umask
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(FILE_MODE))?;
        }

        debug!(
            domain = %domain,
            token = %token,
            path = %path.display(),
            "Presented ACME HTTP-01 challenge"
        );
        Ok(())
    }

    fn cleanup(&self, domain: &str, token: &str, _proof: &str) -> io::Result<CleanupOutcome> {
        let path = self.artifact_path(token)?;

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(domain = %domain, token = %token, "Removed ACME challenge");
                Ok(CleanupOutcome::Removed)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(domain = %domain, token = %token, "ACME challenge already absent");
                Ok(CleanupOutcome::AlreadyAbsent)
            }
            Err(e) => Err(e),
        }
    }
}

/// URL path the authority requests for `token`
pub fn challenge_url_path(token: &str) -> String {
    format!("{}{}", ACME_CHALLENGE_PREFIX, token)
}

/// Tokens are base64url; anything else could escape the challenge directory.
fn check_token(token: &str) -> io::Result<()> {
    let valid = !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid ACME challenge token '{}'", token),
        ))
    }
}

#[derive(Debug)]
struct PresentedChallenge {
    domain: String,
    token: String,
    proof: String,
}

/// Tracks the artifacts presented during one order
///
/// [`ChallengeGuard::cleanup_all`] is the normal exit. If the guard is
/// dropped first (the workflow future was cancelled or bailed out early)
/// remaining artifacts are removed on a best-effort basis.
pub struct ChallengeGuard {
    responder: Arc<dyn ChallengeResponder>,
    pending: Vec<PresentedChallenge>,
}

impl ChallengeGuard {
    pub fn new(responder: Arc<dyn ChallengeResponder>) -> Self {
        Self {
            responder,
            pending: Vec::new(),
        }
    }

    /// Present a challenge and remember it for cleanup.
    pub fn present(&mut self, domain: &str, token: &str, proof: &str) -> io::Result<()> {
        self.responder.present(domain, token, proof)?;
        self.pending.push(PresentedChallenge {
            domain: domain.to_string(),
            token: token.to_string(),
            proof: proof.to_string(),
        });
        Ok(())
    }

    /// Number of artifacts currently published
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Remove every presented artifact.
    ///
    /// Failures are logged and do not propagate: a stale token file is not
    /// worth failing an otherwise successful issuance over.
    pub fn cleanup_all(mut self) {
        self.drain();
    }

    fn drain(&mut self) {
        for challenge in std::mem::take(&mut self.pending) {
            if let Err(e) =
                self.responder
                    .cleanup(&challenge.domain, &challenge.token, &challenge.proof)
            {
                warn!(
                    domain = %challenge.domain,
                    token = %challenge.token,
                    error = %e,
                    "Failed to remove ACME challenge"
                );
            }
        }
    }
}

impl Drop for ChallengeGuard {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                pending = self.pending.len(),
                "Validation interrupted, removing presented challenges"
            );
            self.drain();
        }
    }
}

impl fmt::Debug for ChallengeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeGuard")
            .field("pending", &self.pending.len())
            .finish()
    }
}
