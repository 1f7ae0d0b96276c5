//! Certificate and key persistence
//!
//! Writes the issued chain and private key to the configured locations.
//!
//! # Atomic Writes
//!
//! Both files are staged first, then moved into place:
//! 1. Write `<name>.tmp` next to the target and fsync it
//! 2. Set permissions (0644 chain, 0600 key on Unix)
//! 3. Rename over the target
//!
//! A reader (the web server) never sees a half-written file.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::error::StorageError;
use super::protocol::IssuedCertificate;

/// Permission bits for the world-readable chain
const CERT_MODE: u32 = 0o644;
/// Permission bits for the owner-only private key
const KEY_MODE: u32 = 0o600;

/// Writes issued certificate material to fixed paths
#[derive(Debug, Clone)]
pub struct CertificateStorage {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CertificateStorage {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Persist the chain and key, replacing any previous files.
    pub fn save(&self, certificate: &IssuedCertificate) -> Result<(), StorageError> {
        let staged_cert = stage(&self.cert_path, &certificate.certificate, CERT_MODE)?;
        let staged_key = match stage(&self.key_path, &certificate.private_key, KEY_MODE) {
            Ok(staged) => staged,
            Err(e) => {
                discard(&staged_cert);
                return Err(e);
            }
        };

        if let Err(e) = commit(&staged_cert, &self.cert_path) {
            discard(&staged_cert);
            discard(&staged_key);
            return Err(e);
        }
        // The new chain is in place; until the key follows, the pair does not match
        if let Err(e) = commit(&staged_key, &self.key_path) {
            discard(&staged_key);
            error!(
                cert_path = %self.cert_path.display(),
                key_path = %self.key_path.display(),
                error = %e,
                "New certificate chain installed but its key was not; chain and key do not match"
            );
            return Err(StorageError::KeyMismatch {
                cert_path: self.cert_path.clone(),
                key_path: self.key_path.clone(),
                source: Box::new(e),
            });
        }

        info!(
            cert_path = %self.cert_path.display(),
            key_path = %self.key_path.display(),
            domains = ?certificate.domains,
            "Saved certificate and private key"
        );
        Ok(())
    }
}

fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("certpilot"));
    name.push(".tmp");
    target.with_file_name(name)
}

/// Write `data` to a temporary sibling of `target` with the final mode.
///
/// `mode` only applies on Unix.
fn stage(target: &Path, data: &[u8], mode: u32) -> Result<PathBuf, StorageError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp = temp_path(target);
    let write_err = |source| StorageError::Write {
        path: tmp.clone(),
        source,
    };

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    let mut file = options.open(&tmp).map_err(write_err)?;
    file.write_all(data).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;

    // The file may predate us with other bits, and umask narrows `mode`
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(mode)).map_err(write_err)?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    debug!(path = %tmp.display(), bytes = data.len(), "Staged file");
    Ok(tmp)
}

fn commit(staged: &Path, target: &Path) -> Result<(), StorageError> {
    fs::rename(staged, target).map_err(|source| StorageError::Rename {
        from: staged.to_path_buf(),
        to: target.to_path_buf(),
        source,
    })
}

fn discard(staged: &Path) {
    if let Err(e) = fs::remove_file(staged) {
        warn!(path = %staged.display(), error = %e, "Failed to remove staged file");
    }
}
