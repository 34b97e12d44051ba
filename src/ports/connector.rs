//! SSH Connector Port
//!
//! This module defines traits for SSH connection creation and the channels
//! opened on a connection, abstracting away the underlying SSH implementation
//! for testability.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use super::remote_fs::RemoteFs;
use super::shell::ShellChannel;
use crate::config::LimitsConfig;
use crate::domain::{ConnectTarget, PtyRequest};
use crate::error::Result;

/// Trait for creating SSH connections
#[async_trait]
pub trait SshConnector: Send + Sync + 'static {
    /// The type of client returned by this connector
    type Client: SshClientTrait;

    /// Dial and authenticate.
    ///
    /// Fails with a connect-kind error when the dial, the host key check or
    /// authentication fails, and with `Config` for unusable credentials.
    async fn connect(&self, target: &ConnectTarget, limits: &LimitsConfig)
    -> Result<Self::Client>;
}

/// Operations on an authenticated SSH connection
#[async_trait]
pub trait SshClientTrait: Send + Sync + 'static {
    type Shell: ShellChannel;
    type Files: RemoteFs;

    /// Open a session channel, request a PTY and start a shell.
    ///
    /// Failures are `SessionSetup` errors naming the stage that failed.
    async fn open_shell(&self, pty: &PtyRequest) -> Result<Self::Shell>;

    /// Open the SFTP subsystem on a fresh channel.
    async fn open_sftp(&self) -> Result<Self::Files>;

    /// Get the host label used in logs
    fn host_name(&self) -> &str;

    /// Close the connection
    fn close(self) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}
