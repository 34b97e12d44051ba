//! Bearer token gate in front of the terminal and file endpoints.
//!
//! Real authentication lives outside this service; the gate only refuses
//! requests that carry no token or a token that is not on the configured list.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{BridgeError, Result};

pub trait TokenVerifier: Send + Sync {
    /// # Errors
    ///
    /// Returns `Unauthorized` when the token is missing or rejected.
    fn verify(&self, token: Option<&str>) -> Result<()>;
}

/// Checks tokens against a fixed list of SHA-256 digests.
pub struct StaticTokenVerifier {
    digests: Vec<[u8; 32]>,
}

impl StaticTokenVerifier {
    #[must_use]
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Self {
        if tokens.is_empty() {
            warn!("No server tokens configured: any non-empty token will be accepted");
        }
        Self {
            digests: tokens.iter().map(|t| digest(t.as_ref())).collect(),
        }
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: Option<&str>) -> Result<()> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BridgeError::Unauthorized("missing token".to_string()))?;

        if self.digests.is_empty() {
            return Ok(());
        }

        let candidate = digest(token);
        if self.digests.iter().any(|d| *d == candidate) {
            Ok(())
        } else {
            Err(BridgeError::Unauthorized("token rejected".to_string()))
        }
    }
}
