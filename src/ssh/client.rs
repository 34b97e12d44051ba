use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use russh::client::{self, Config, Handle, Handler, Msg};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{PublicKey, decode_secret_key};
use russh::{Channel, ChannelMsg, Pty};
use russh_sftp::client::SftpSession;
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::domain::{ConnectTarget, HostKeyPolicy, PtyRequest, SessionState, SshAuth};
use crate::error::{BridgeError, Result};
use crate::ssh::known_hosts::HostKeyVerifier;
use crate::ssh::sftp::SftpClient;
use crate::ssh::shell::RusshShell;

/// Echo on, 14400 baud both ways
const TERMINAL_MODES: [(Pty, u32); 3] = [
    (Pty::ECHO, 1),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
];

/// Sanitize SSH error messages to prevent credential leakage.
/// Masks authentication method names that could aid reconnaissance
/// and truncates long messages that might contain data dumps.
pub(crate) fn sanitize_ssh_error(error: &impl std::fmt::Display) -> String {
    let mut msg = error.to_string();
    for method in &["publickey", "keyboard-interactive", "gssapi-with-mic"] {
        msg = msg.replace(method, "***");
    }
    if msg.len() > 500 {
        let cut = (0..=500).rev().find(|i| msg.is_char_boundary(*i)).unwrap_or(0);
        format!("{}... (truncated)", &msg[..cut])
    } else {
        msg
    }
}

/// SSH client handler for russh with host key verification
struct ClientHandler {
    hostname: String,
    port: u16,
    policy: HostKeyPolicy,
    verifier: Arc<HostKeyVerifier>,
    /// Why the key was refused, so the dial error can say so
    rejection: Arc<Mutex<Option<BridgeError>>>,
}

impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self
            .verifier
            .verify(&self.hostname, self.port, server_public_key, &self.policy)
        {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!(host = %self.hostname, error = %e, "Host key verification failed");
                if let Ok(mut slot) = self.rejection.lock() {
                    *slot = Some(e);
                }
                Ok(false)
            }
        }
    }
}

/// SSH client wrapper
pub struct SshClient {
    handle: Handle<ClientHandler>,
    host_name: String,
    sftp_chunk_size: usize,
    setup_timeout: Duration,
}

impl SshClient {
    /// Dial and authenticate
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The SSH connection cannot be established (network error, timeout)
    /// - Host key verification fails
    /// - The private key cannot be parsed
    /// - Authentication is rejected
    #[must_use = "the SSH client must be used or closed"]
    pub async fn connect(
        target: &ConnectTarget,
        limits: &LimitsConfig,
        verifier: Arc<HostKeyVerifier>,
        sftp_chunk_size: usize,
    ) -> Result<Self> {
        let setup_timeout = Duration::from_secs(limits.connection_timeout_seconds);
        let handle = Self::establish_connection(target, limits, verifier).await?;
        let handle = timeout(setup_timeout, Self::authenticate(handle, target))
            .await
            .map_err(|_| {
                tracing::error!(host = %target.endpoint(), "SSH authentication timeout");
                BridgeError::SshConnection {
                    host: target.endpoint(),
                    reason: format!(
                        "Authentication timeout after {}s",
                        setup_timeout.as_secs()
                    ),
                }
            })??;
        tracing::info!(
            host_id = target.host_id,
            host = %target.endpoint(),
            user = %target.username,
            method = target.auth.method(),
            "SSH connection established"
        );
        Ok(Self {
            handle,
            host_name: target.endpoint(),
            sftp_chunk_size,
            setup_timeout,
        })
    }

    async fn establish_connection(
        target: &ConnectTarget,
        limits: &LimitsConfig,
        verifier: Arc<HostKeyVerifier>,
    ) -> Result<Handle<ClientHandler>> {
        let keepalive = Duration::from_secs(limits.keepalive_interval_seconds);
        let config = Arc::new(Config {
            inactivity_timeout: None,
            keepalive_interval: Some(keepalive),
            keepalive_max: 3,
            ..Default::default()
        });

        let rejection = Arc::new(Mutex::new(None));
        let handler = ClientHandler {
            hostname: target.address.clone(),
            port: target.port,
            policy: target.host_key.clone(),
            verifier,
            rejection: Arc::clone(&rejection),
        };

        let addr = (target.address.as_str(), target.port);
        let endpoint = target.endpoint();
        let timeout_secs = limits.connection_timeout_seconds;

        let connected = timeout(
            Duration::from_secs(timeout_secs),
            client::connect(config, addr, handler),
        )
        .await
        .map_err(|_| {
            tracing::error!(host = %endpoint, timeout_secs, "SSH connection timeout");
            BridgeError::SshConnection {
                host: endpoint.clone(),
                reason: format!("Connection timeout after {timeout_secs}s"),
            }
        })?;

        connected.map_err(|e| {
            if let Some(refused) = rejection.lock().ok().and_then(|mut slot| slot.take()) {
                return refused;
            }
            tracing::error!(host = %endpoint, error = %sanitize_ssh_error(&e), "SSH connection failed");
            BridgeError::SshConnection {
                host: endpoint.clone(),
                reason: sanitize_ssh_error(&e),
            }
        })
    }

    async fn authenticate(
        mut handle: Handle<ClientHandler>,
        target: &ConnectTarget,
    ) -> Result<Handle<ClientHandler>> {
        let user = target.username.as_str();
        let endpoint = target.endpoint();

        let outcome = match &target.auth {
            SshAuth::Password(password) => {
                handle
                    .authenticate_password(user, password.as_str())
                    .await
            }
            SshAuth::PrivateKey(pem) => {
                let key = decode_secret_key(pem.as_str(), None).map_err(|e| {
                    tracing::error!(host = %endpoint, error = %sanitize_ssh_error(&e), "Stored private key is unusable");
                    BridgeError::SshKeyInvalid {
                        user: user.to_string(),
                        host: endpoint.clone(),
                    }
                })?;
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                    .await
            }
        };

        let auth_result = outcome.map_err(|e| {
            tracing::error!(host = %endpoint, user = %user, error = %sanitize_ssh_error(&e), method = target.auth.method(), "SSH authentication error");
            BridgeError::SshAuth {
                user: user.to_string(),
                host: endpoint.clone(),
            }
        })?;

        if !auth_result.success() {
            tracing::error!(host = %endpoint, user = %user, method = target.auth.method(), "SSH authentication rejected");
            return Err(BridgeError::SshAuth {
                user: user.to_string(),
                host: endpoint,
            });
        }

        Ok(handle)
    }

    /// Get the host name
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Open a session channel, request a PTY and start a shell.
    ///
    /// # Errors
    ///
    /// Returns `SessionSetup` naming the stage that failed.
    pub async fn open_terminal(&self, pty: &PtyRequest) -> Result<RusshShell> {
        let mut pending = VecDeque::new();
        let limit = self.setup_timeout;

        let mut channel = timeout(limit, self.handle.channel_open_session())
            .await
            .map_err(|_| setup_timed_out(SessionState::Connecting, limit))?
            .map_err(|e| BridgeError::session_setup(SessionState::Connecting.as_str(), sanitize_ssh_error(&e)))?;

        let stage = SessionState::PtyRequested;
        channel
            .request_pty(
                true,
                &pty.term,
                pty.size.cols,
                pty.size.rows,
                0,
                0,
                &TERMINAL_MODES,
            )
            .await
            .map_err(|e| BridgeError::session_setup(stage.as_str(), sanitize_ssh_error(&e)))?;
        timeout(limit, await_reply(&mut channel, stage, &mut pending))
            .await
            .map_err(|_| setup_timed_out(stage, limit))??;

        let stage = SessionState::ShellRunning;
        channel
            .request_shell(true)
            .await
            .map_err(|e| BridgeError::session_setup(stage.as_str(), sanitize_ssh_error(&e)))?;
        timeout(limit, await_reply(&mut channel, stage, &mut pending))
            .await
            .map_err(|_| setup_timed_out(stage, limit))??;

        tracing::debug!(
            host = %self.host_name,
            cols = pty.size.cols,
            rows = pty.size.rows,
            term = %pty.term,
            "Shell started"
        );
        Ok(RusshShell::new(channel, pending))
    }

    /// Create an SFTP session for file operations
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The SSH channel cannot be opened
    /// - The SFTP subsystem request fails
    /// - SFTP initialization fails
    pub async fn sftp_session(&self) -> Result<SftpClient> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| BridgeError::sftp("open", "-", format!("Failed to open channel: {e}")))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| {
                BridgeError::sftp("open", "-", format!("Failed to request SFTP subsystem: {e}"))
            })?;

        let session = SftpSession::new(channel.into_stream()).await.map_err(|e| {
            BridgeError::sftp("open", "-", format!("Failed to initialize SFTP session: {e}"))
        })?;

        Ok(SftpClient::new(session, self.sftp_chunk_size))
    }

    /// Close the connection (with 5s timeout to avoid blocking)
    ///
    /// # Errors
    ///
    /// Returns an error if the disconnect message cannot be sent to the server.
    pub async fn close(self) -> Result<()> {
        match timeout(
            Duration::from_secs(5),
            self.handle
                .disconnect(russh::Disconnect::ByApplication, "", "en"),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BridgeError::SshConnection {
                host: self.host_name,
                reason: e.to_string(),
            }),
            Err(_) => {
                tracing::warn!(host = %self.host_name, "Timeout closing SSH connection, forcing drop");
                Ok(())
            }
        }
    }
}

fn setup_timed_out(stage: SessionState, limit: Duration) -> BridgeError {
    BridgeError::session_setup(
        stage.as_str(),
        format!("no reply within {}s", limit.as_secs()),
    )
}

/// Wait for the server's answer to a `want_reply` request.
///
/// Output that races ahead of the reply is kept for the relay.
async fn await_reply(
    channel: &mut Channel<Msg>,
    stage: SessionState,
    pending: &mut VecDeque<Bytes>,
) -> Result<()> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => {
                return Err(BridgeError::session_setup(
                    stage.as_str(),
                    "request rejected by server",
                ));
            }
            Some(ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. }) => {
                pending.push_back(Bytes::copy_from_slice(&data));
            }
            Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                return Err(BridgeError::session_setup(
                    stage.as_str(),
                    "channel closed by server",
                ));
            }
            Some(_) => {}
        }
    }
}
