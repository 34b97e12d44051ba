//! Terminal session relay
//!
//! One session owns one shell and one WebSocket. Three tasks run until the
//! first of them stops:
//!
//! - the reader pulls client frames under a read deadline, answers control
//!   messages in place and queues input and resizes for the shell;
//! - the pump owns the shell, applies queued commands and queues output;
//! - the writer owns the WebSocket sink, sends queued frames and the
//!   periodic ping.
//!
//! All three share one [`CancellationToken`]. The first to stop records
//! the [`EndReason`] and cancels the others. The writer flushes what is
//! already queued and sends a close frame; the pump closes the shell.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{ClientMessage, ControlMessage, WsFrame, decode_client_frame, pong_frame};
use crate::config::{FramingPolicy, TerminalConfig};
use crate::domain::{SessionState, TerminalSize};
use crate::error::{BridgeError, Result};
use crate::ports::ShellChannel;

const COMMAND_QUEUE: usize = 64;

/// Timing and framing knobs for one session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ping_interval: Duration,
    pub read_deadline: Duration,
    pub framing: FramingPolicy,
    pub outbound_queue: usize,
}

impl SessionSettings {
    #[must_use]
    pub fn from_config(config: &TerminalConfig) -> Self {
        Self {
            ping_interval: Duration::from_secs(config.ping_interval_seconds),
            read_deadline: Duration::from_secs(config.read_deadline_seconds),
            framing: config.framing,
            outbound_queue: config.outbound_queue.max(1),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&TerminalConfig::default())
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    ClientClosed,
    ClientReadFailed(String),
    ReadDeadline,
    ClientWriteFailed(String),
    ShellEof,
    ShellReadFailed(String),
    ShellWriteFailed(String),
    /// A relay task stopped without recording a reason
    Aborted,
}

impl EndReason {
    /// Whether the session ended because something broke
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::ClientClosed | Self::ShellEof)
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientClosed => f.write_str("client closed"),
            Self::ClientReadFailed(e) => write!(f, "websocket read failed: {e}"),
            Self::ReadDeadline => f.write_str("read deadline expired"),
            Self::ClientWriteFailed(e) => write!(f, "websocket write failed: {e}"),
            Self::ShellEof => f.write_str("shell exited"),
            Self::ShellReadFailed(e) => write!(f, "shell read failed: {e}"),
            Self::ShellWriteFailed(e) => write!(f, "shell write failed: {e}"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// Summary returned when a session is over
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub reason: EndReason,
    pub bytes_from_client: u64,
    pub bytes_to_client: u64,
    pub resizes: u32,
    pub final_size: TerminalSize,
    pub duration: Duration,
}

enum ShellCommand {
    Input(Bytes),
    Resize(TerminalSize),
}

/// Shared stop signal plus the first recorded reason
#[derive(Clone)]
struct Teardown {
    cancel: CancellationToken,
    reason: Arc<OnceLock<EndReason>>,
}

impl Teardown {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    fn finish(&self, reason: EndReason) {
        if self.reason.set(reason).is_ok() {
            debug!(state = %SessionState::Closing, reason = ?self.reason.get(), "Session closing");
        }
        self.cancel.cancel();
    }

    fn reason(&self) -> EndReason {
        self.reason.get().cloned().unwrap_or(EndReason::Aborted)
    }
}

/// Queue `item` unless the session is being torn down first.
async fn forward<T>(tx: &mpsc::Sender<T>, item: T, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// A running shell waiting to be attached to a WebSocket
pub struct TerminalSession<S> {
    id: Uuid,
    shell: S,
    size: TerminalSize,
    settings: SessionSettings,
}

impl<S: ShellChannel> TerminalSession<S> {
    #[must_use]
    pub fn new(shell: S, size: TerminalSize, settings: SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            shell,
            size,
            settings,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Relay until either side stops, then tear everything down.
    ///
    /// The shell is closed and the sink receives a close frame before this
    /// returns, whatever ended the session.
    pub async fn run<W, R>(self, sink: W, stream: R) -> SessionReport
    where
        W: Sink<WsFrame, Error = BridgeError> + Send + Unpin + 'static,
        R: Stream<Item = Result<WsFrame>> + Send + Unpin + 'static,
    {
        let Self {
            id,
            shell,
            size,
            settings,
        } = self;
        let started = Instant::now();
        let teardown = Teardown::new();
        let _guard = teardown.cancel.clone().drop_guard();

        let (out_tx, out_rx) = mpsc::channel(settings.outbound_queue);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);

        info!(
            session_id = %id,
            state = %SessionState::ShellRunning,
            cols = size.cols,
            rows = size.rows,
            "Terminal session running"
        );

        let writer = tokio::spawn(write_loop(
            sink,
            out_rx,
            settings.clone(),
            teardown.clone(),
        ));
        let pump = tokio::spawn(pump_loop(
            shell,
            size,
            cmd_rx,
            out_tx.clone(),
            teardown.clone(),
        ));
        let reader = tokio::spawn(read_loop(stream, cmd_tx, out_tx, settings, teardown.clone()));

        let (reader, pump, writer) = tokio::join!(reader, pump, writer);
        for (task, joined) in [
            ("reader", reader.as_ref().err()),
            ("pump", pump.as_ref().err()),
            ("writer", writer.as_ref().err()),
        ] {
            if let Some(e) = joined {
                warn!(session_id = %id, task, error = %e, "Relay task did not finish cleanly");
            }
        }

        let pump = pump.unwrap_or(PumpStats {
            bytes: 0,
            resizes: 0,
            size,
        });
        let report = SessionReport {
            session_id: id,
            reason: teardown.reason(),
            bytes_from_client: reader.unwrap_or(0),
            bytes_to_client: pump.bytes,
            resizes: pump.resizes,
            final_size: pump.size,
            duration: started.elapsed(),
        };

        info!(
            session_id = %id,
            state = %SessionState::Closed,
            reason = %report.reason,
            bytes_in = report.bytes_from_client,
            bytes_out = report.bytes_to_client,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "Terminal session closed"
        );
        report
    }
}

/// Client to host. Returns the number of input bytes queued for the shell.
async fn read_loop<R>(
    mut stream: R,
    commands: mpsc::Sender<ShellCommand>,
    outbound: mpsc::Sender<WsFrame>,
    settings: SessionSettings,
    teardown: Teardown,
) -> u64
where
    R: Stream<Item = Result<WsFrame>> + Unpin,
{
    let _guard = teardown.cancel.clone().drop_guard();
    let cancel = &teardown.cancel;
    let mut bytes = 0u64;

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = timeout(settings.read_deadline, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                warn!(
                    deadline_secs = settings.read_deadline.as_secs(),
                    "No frames from client before the read deadline"
                );
                teardown.finish(EndReason::ReadDeadline);
                break;
            }
            Ok(None) => {
                teardown.finish(EndReason::ClientClosed);
                break;
            }
            Ok(Some(Err(e))) => {
                teardown.finish(EndReason::ClientReadFailed(e.to_string()));
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match decode_client_frame(frame, settings.framing) {
            ClientMessage::Input(data) => {
                bytes += data.len() as u64;
                if !forward(&commands, ShellCommand::Input(data), cancel).await {
                    break;
                }
            }
            ClientMessage::Control(ControlMessage::Resize { cols, rows }) => {
                match TerminalSize::from_signed(cols, rows) {
                    Some(size) => {
                        if !forward(&commands, ShellCommand::Resize(size), cancel).await {
                            break;
                        }
                    }
                    None => warn!(cols, rows, "Rejected resize with invalid dimensions"),
                }
            }
            ClientMessage::Control(ControlMessage::Ping) => {
                let pong = pong_frame(chrono::Utc::now().timestamp());
                if !forward(&outbound, pong, cancel).await {
                    break;
                }
            }
            ClientMessage::Control(ControlMessage::Pong) | ClientMessage::Heartbeat => {}
            ClientMessage::Close => {
                teardown.finish(EndReason::ClientClosed);
                break;
            }
            ClientMessage::Dropped(text) => {
                warn!(len = text.len(), "Dropped text frame that is not a control message");
            }
        }
    }

    bytes
}

struct PumpStats {
    bytes: u64,
    resizes: u32,
    size: TerminalSize,
}

/// Host to client, plus every write to the shell.
async fn pump_loop<S: ShellChannel>(
    mut shell: S,
    mut size: TerminalSize,
    mut commands: mpsc::Receiver<ShellCommand>,
    outbound: mpsc::Sender<WsFrame>,
    teardown: Teardown,
) -> PumpStats {
    let _guard = teardown.cancel.clone().drop_guard();
    let cancel = &teardown.cancel;
    let mut bytes = 0u64;
    let mut resizes = 0u32;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            output = shell.recv() => match output {
                Ok(Some(chunk)) => {
                    bytes += chunk.len() as u64;
                    if !forward(&outbound, WsFrame::Binary(chunk), cancel).await {
                        break;
                    }
                }
                Ok(None) => {
                    teardown.finish(EndReason::ShellEof);
                    break;
                }
                Err(e) => {
                    teardown.finish(EndReason::ShellReadFailed(e.to_string()));
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(ShellCommand::Input(data)) => {
                    if let Err(e) = shell.send_input(&data).await {
                        teardown.finish(EndReason::ShellWriteFailed(e.to_string()));
                        break;
                    }
                }
                Some(ShellCommand::Resize(next)) => {
                    if let Err(e) = shell.window_change(next).await {
                        teardown.finish(EndReason::ShellWriteFailed(e.to_string()));
                        break;
                    }
                    debug!(cols = next.cols, rows = next.rows, "Terminal resized");
                    size = next;
                    resizes += 1;
                }
                None => break,
            },
        }
    }

    if let Err(e) = shell.close().await {
        debug!(error = %e, "Closing shell");
    }

    PumpStats {
        bytes,
        resizes,
        size,
    }
}

async fn send_bounded<W>(sink: &mut W, frame: WsFrame, limit: Duration) -> Result<()>
where
    W: Sink<WsFrame, Error = BridgeError> + Unpin,
{
    timeout(limit, sink.send(frame))
        .await
        .map_err(|_| BridgeError::relay_io("websocket write", "timed out"))?
}

/// The only task that touches the WebSocket sink.
async fn write_loop<W>(
    mut sink: W,
    mut outbound: mpsc::Receiver<WsFrame>,
    settings: SessionSettings,
    teardown: Teardown,
) where
    W: Sink<WsFrame, Error = BridgeError> + Unpin,
{
    let _guard = teardown.cancel.clone().drop_guard();
    let limit = settings.read_deadline;
    let mut ticker = interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            biased;
            () = teardown.cancel.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = ticker.tick() => WsFrame::Ping(Bytes::new()),
        };
        if let Err(e) = send_bounded(&mut sink, frame, limit).await {
            teardown.finish(EndReason::ClientWriteFailed(e.to_string()));
            break;
        }
    }

    // Flush what was queued before teardown, then close
    outbound.close();
    while let Ok(frame) = outbound.try_recv() {
        if send_bounded(&mut sink, frame, limit).await.is_err() {
            break;
        }
    }
    if let Err(e) = send_bounded(&mut sink, WsFrame::Close, limit).await {
        debug!(error = %e, "Sending close frame");
    }
    match timeout(limit, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Closing websocket"),
        Err(_) => debug!("Timed out closing websocket"),
    }
}
