//! Terminal Service
//!
//! Orchestrates one terminal request: look up the host, pick an address,
//! decrypt the credential, dial, start a shell and relay until the session
//! ends. Setup failures are reported to the client once as an error frame.

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::protocol::{WsFrame, error_frame};
use super::session::{SessionReport, SessionSettings, TerminalSession};
use crate::config::{LimitsConfig, TerminalConfig};
use crate::domain::{
    ConnectionStatus, IpPreference, PtyRequest, SessionState, TerminalSize, resolve_target,
};
use crate::error::{BridgeError, Result};
use crate::ports::{HostRegistry, SshClientTrait, SshConnector};
use crate::security::CredentialCipher;

/// One WebSocket terminal request
#[derive(Debug, Clone, Copy)]
pub struct TerminalRequest {
    pub host_id: u64,
    pub ip_preference: IpPreference,
    /// Initial size negotiated by the client, if any
    pub size: Option<TerminalSize>,
}

pub struct TerminalService<C: SshConnector> {
    connector: Arc<C>,
    registry: Arc<dyn HostRegistry>,
    cipher: Arc<CredentialCipher>,
    limits: LimitsConfig,
    terminal: TerminalConfig,
}

impl<C: SshConnector> TerminalService<C> {
    pub fn new(
        connector: Arc<C>,
        registry: Arc<dyn HostRegistry>,
        cipher: Arc<CredentialCipher>,
        limits: LimitsConfig,
        terminal: TerminalConfig,
    ) -> Self {
        Self {
            connector,
            registry,
            cipher,
            limits,
            terminal,
        }
    }

    /// PTY request for a session, falling back to the configured size
    #[must_use]
    pub fn pty_request(&self, size: Option<TerminalSize>) -> PtyRequest {
        PtyRequest {
            term: self.terminal.term.clone(),
            size: size.unwrap_or(TerminalSize {
                cols: self.terminal.default_cols,
                rows: self.terminal.default_rows,
            }),
        }
    }

    async fn open(
        &self,
        request: TerminalRequest,
        pty: &PtyRequest,
    ) -> Result<(C::Client, <C::Client as SshClientTrait>::Shell)> {
        let spec = self.registry.resolve(request.host_id).await?;
        let target = resolve_target(&spec, request.ip_preference, &self.cipher)?;
        let limit = self.setup_limit();
        let client = timeout(limit, self.connector.connect(&target, &self.limits))
            .await
            .map_err(|_| BridgeError::SshConnection {
                host: target.endpoint(),
                reason: format!("Connection timeout after {}s", limit.as_secs()),
            })??;
        drop(target);

        let opened = timeout(limit, client.open_shell(pty))
            .await
            .unwrap_or_else(|_| {
                Err(BridgeError::session_setup(
                    SessionState::ShellRunning.as_str(),
                    format!("no reply within {}s", limit.as_secs()),
                ))
            });
        match opened {
            Ok(shell) => Ok((client, shell)),
            Err(e) => {
                if let Err(close_err) = client.close().await {
                    warn!(host_id = request.host_id, error = %close_err, "Closing SSH client after failed shell start");
                }
                Err(e)
            }
        }
    }

    /// Run one terminal session over an upgraded WebSocket.
    ///
    /// Returns once the session and every channel it opened are closed.
    ///
    /// # Errors
    ///
    /// Returns the setup error after it has been sent to the client. Errors
    /// that end a running session are reported in [`SessionReport::reason`].
    pub async fn serve<W, R>(
        &self,
        request: TerminalRequest,
        mut sink: W,
        stream: R,
    ) -> Result<SessionReport>
    where
        W: Sink<WsFrame, Error = BridgeError> + Send + Unpin + 'static,
        R: Stream<Item = Result<WsFrame>> + Send + Unpin + 'static,
    {
        let host_id = request.host_id;
        let pty = self.pty_request(request.size);

        let (client, shell) = match self.open(request, &pty).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(host_id, kind = %e.kind(), error = %e, "Terminal setup failed");
                self.registry
                    .record_status(host_id, ConnectionStatus::Failed)
                    .await;
                report_setup_error(&mut sink, &e, self.read_deadline()).await;
                return Err(e);
            }
        };

        self.registry
            .record_status(host_id, ConnectionStatus::Connected)
            .await;
        let host = client.host_name().to_string();
        let session = TerminalSession::new(
            shell,
            pty.size,
            SessionSettings::from_config(&self.terminal),
        );
        info!(host_id, host = %host, session_id = %session.id(), "Terminal session started");

        let report = session.run(sink, stream).await;

        if let Err(e) = client.close().await {
            warn!(host_id, host = %host, error = %e, "Disconnecting SSH client");
        }
        self.registry
            .record_status(host_id, ConnectionStatus::Disconnected)
            .await;
        info!(
            host_id,
            host = %host,
            session_id = %report.session_id,
            reason = %report.reason,
            "Terminal session finished"
        );
        Ok(report)
    }

    /// Bound for the dial and for the shell start
    fn setup_limit(&self) -> Duration {
        Duration::from_secs(self.limits.connection_timeout_seconds)
    }

    fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.terminal.read_deadline_seconds)
    }
}

/// Send the diagnostic frame once, then close.
async fn report_setup_error<W>(sink: &mut W, error: &BridgeError, limit: Duration)
where
    W: Sink<WsFrame, Error = BridgeError> + Unpin,
{
    let frames = [error_frame(&error.to_string()), WsFrame::Close];
    for frame in frames {
        match timeout(limit, sink.send(frame)).await {
            Ok(Ok(())) => {}
            _ => break,
        }
    }
    match timeout(limit, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Closing websocket after setup error"),
        Err(_) => debug!("Timed out closing websocket after setup error"),
    }
}
