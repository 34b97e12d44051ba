//! SSH Connector Adapter
//!
//! Concrete implementation of the `SshConnector` and `SshClientTrait` ports
//! using the russh SSH client.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::LimitsConfig;
use crate::domain::{ConnectTarget, PtyRequest};
use crate::error::Result;
use crate::ports::{SshClientTrait, SshConnector};
use crate::ssh::known_hosts::HostKeyVerifier;
use crate::ssh::{RusshShell, SftpClient, SshClient};

/// Real SSH connector using russh
#[derive(Debug, Clone)]
pub struct RusshConnector {
    verifier: Arc<HostKeyVerifier>,
    sftp_chunk_size: usize,
}

impl RusshConnector {
    #[must_use]
    pub fn new(verifier: HostKeyVerifier, sftp_chunk_size: usize) -> Self {
        Self {
            verifier: Arc::new(verifier),
            sftp_chunk_size,
        }
    }
}

#[async_trait]
impl SshConnector for RusshConnector {
    type Client = SshClient;

    async fn connect(&self, target: &ConnectTarget, limits: &LimitsConfig) -> Result<SshClient> {
        SshClient::connect(
            target,
            limits,
            Arc::clone(&self.verifier),
            self.sftp_chunk_size,
        )
        .await
    }
}

#[async_trait]
impl SshClientTrait for SshClient {
    type Shell = RusshShell;
    type Files = SftpClient;

    async fn open_shell(&self, pty: &PtyRequest) -> Result<RusshShell> {
        self.open_terminal(pty).await
    }

    async fn open_sftp(&self) -> Result<SftpClient> {
        self.sftp_session().await
    }

    fn host_name(&self) -> &str {
        self.host_name()
    }

    fn close(self) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move { self.close().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_clone_shares_verifier() {
        let connector = RusshConnector::new(HostKeyVerifier::default(), 4096);
        let cloned = connector.clone();
        assert!(Arc::ptr_eq(&connector.verifier, &cloned.verifier));
        assert_eq!(cloned.sftp_chunk_size, 4096);
    }
}
