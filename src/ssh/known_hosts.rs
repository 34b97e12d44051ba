//! Host key policies on top of russh's `known_hosts` support

use std::path::PathBuf;

use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{Error as KeyError, HashAlg, PublicKey};
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use crate::domain::HostKeyPolicy;
use crate::error::{BridgeError, Result};

/// Result of looking a host key up in `known_hosts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// Key matches a known entry
    Match,
    /// Host is known with a different key (line of the conflicting entry)
    Mismatch { line: usize },
    /// Host is not in `known_hosts`
    Unknown,
}

/// Get the fingerprint of a public key
#[must_use]
pub fn fingerprint(key: &PublicKey) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

/// Applies a [`HostKeyPolicy`] against one `known_hosts` file.
#[derive(Debug, Clone, Default)]
pub struct HostKeyVerifier {
    /// `None` uses `~/.ssh/known_hosts`
    path: Option<PathBuf>,
}

impl HostKeyVerifier {
    #[must_use]
    pub fn new(path: Option<&str>) -> Self {
        Self {
            path: path.map(|p| PathBuf::from(shellexpand::tilde(p).as_ref())),
        }
    }

    fn effective_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts")))
    }

    /// Look the key up in `known_hosts`
    ///
    /// # Errors
    ///
    /// Returns an error if the `known_hosts` file cannot be read or parsed.
    pub fn lookup(&self, hostname: &str, port: u16, key: &PublicKey) -> Result<VerifyResult> {
        let checked = match &self.path {
            Some(path) => check_known_hosts_path(hostname, port, key, path),
            None => check_known_hosts(hostname, port, key),
        };
        match checked {
            Ok(true) => {
                debug!(hostname = %hostname, port = %port, "Host key verified");
                Ok(VerifyResult::Match)
            }
            Ok(false) => Ok(VerifyResult::Unknown),
            Err(KeyError::KeyChanged { line }) => {
                warn!(
                    hostname = %hostname,
                    port = %port,
                    line = %line,
                    "Host key mismatch detected"
                );
                Ok(VerifyResult::Mismatch { line })
            }
            Err(e) => Err(BridgeError::Config(format!(
                "Failed to check known_hosts: {e}"
            ))),
        }
    }

    fn learn(&self, hostname: &str, port: u16, key: &PublicKey) -> Result<()> {
        match &self.path {
            Some(path) => learn_known_hosts_path(hostname, port, key, path),
            None => learn_known_hosts(hostname, port, key),
        }
        .map_err(|e| BridgeError::Config(format!("Failed to add host key to known_hosts: {e}")))?;
        debug!(hostname = %hostname, port = %port, "Added host key to known_hosts");
        Ok(())
    }

    #[cfg(unix)]
    fn check_permissions(&self) {
        let Some(path) = self.effective_path() else {
            return;
        };
        if let Ok(metadata) = std::fs::metadata(&path) {
            let mode = metadata.mode() & 0o777;
            if mode & 0o022 != 0 {
                warn!(
                    path = %path.display(),
                    mode = format!("{mode:o}"),
                    "known_hosts file is writable by others"
                );
            }
        }
    }

    #[cfg(not(unix))]
    fn check_permissions(&self) {}

    /// Decide whether to trust `key` for `hostname:port`.
    ///
    /// # Errors
    ///
    /// - `SshHostKeyMismatch` when the key differs from the recorded or pinned one
    /// - `SshHostKeyUnknown` for unknown hosts under `Strict`
    /// - `Config` when `known_hosts` cannot be read or written
    pub fn verify(
        &self,
        hostname: &str,
        port: u16,
        key: &PublicKey,
        policy: &HostKeyPolicy,
    ) -> Result<()> {
        match policy {
            HostKeyPolicy::Off => {
                warn!(
                    hostname = %hostname,
                    fingerprint = %fingerprint(key),
                    "Host key verification is DISABLED for this host; accepting any key"
                );
                Ok(())
            }
            HostKeyPolicy::Pinned(expected) => {
                let actual = fingerprint(key);
                if actual == expected.trim() {
                    Ok(())
                } else {
                    Err(BridgeError::SshHostKeyMismatch {
                        host: hostname.to_string(),
                        expected: expected.clone(),
                        actual,
                    })
                }
            }
            HostKeyPolicy::Strict => {
                self.check_permissions();
                match self.lookup(hostname, port, key)? {
                    VerifyResult::Match => Ok(()),
                    VerifyResult::Mismatch { line } => Err(mismatch(hostname, line, key)),
                    VerifyResult::Unknown => Err(BridgeError::SshHostKeyUnknown {
                        host: hostname.to_string(),
                        fingerprint: fingerprint(key),
                    }),
                }
            }
            HostKeyPolicy::AcceptNew => {
                self.check_permissions();
                match self.lookup(hostname, port, key)? {
                    VerifyResult::Match => Ok(()),
                    VerifyResult::Mismatch { line } => Err(mismatch(hostname, line, key)),
                    VerifyResult::Unknown => {
                        warn!(
                            hostname = %hostname,
                            fingerprint = %fingerprint(key),
                            "Trusting new host key on first use"
                        );
                        self.learn(hostname, port, key)
                    }
                }
            }
        }
    }
}

fn mismatch(hostname: &str, line: usize, key: &PublicKey) -> BridgeError {
    BridgeError::SshHostKeyMismatch {
        host: hostname.to_string(),
        expected: format!("key from known_hosts line {line}"),
        actual: fingerprint(key),
    }
}
