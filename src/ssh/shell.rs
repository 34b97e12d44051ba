use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tracing::debug;

use crate::domain::TerminalSize;
use crate::error::{BridgeError, Result};
use crate::ports::ShellChannel;

/// Interactive shell on a russh session channel
pub struct RusshShell {
    channel: Option<Channel<Msg>>,
    /// Output that arrived while waiting for request replies
    pending: VecDeque<Bytes>,
}

impl RusshShell {
    pub(crate) fn new(channel: Channel<Msg>, pending: VecDeque<Bytes>) -> Self {
        Self {
            channel: Some(channel),
            pending,
        }
    }
}

#[async_trait]
impl ShellChannel for RusshShell {
    async fn recv(&mut self) -> Result<Option<Bytes>> {
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(Some(chunk));
        }
        let Some(channel) = self.channel.as_mut() else {
            return Ok(None);
        };
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. }) => {
                    return Ok(Some(Bytes::copy_from_slice(&data)));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!(exit_status, "Remote shell exited");
                }
                Some(ChannelMsg::Eof | ChannelMsg::Close) | None => return Ok(None),
                Some(_) => {}
            }
        }
    }

    async fn send_input(&mut self, data: &[u8]) -> Result<()> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| BridgeError::relay_io("ssh stdin", "channel closed"))?;
        channel
            .data(data)
            .await
            .map_err(|e| BridgeError::relay_io("ssh stdin", e))
    }

    async fn window_change(&mut self, size: TerminalSize) -> Result<()> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| BridgeError::relay_io("ssh window-change", "channel closed"))?;
        channel
            .window_change(size.cols, size.rows, 0, 0)
            .await
            .map_err(|e| BridgeError::relay_io("ssh window-change", e))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(channel) = self.channel.take() else {
            return Ok(());
        };
        self.pending.clear();
        // Peer may already be gone; nothing left to report
        if let Err(e) = channel.eof().await {
            debug!(error = %e, "EOF on closed shell channel");
        }
        if let Err(e) = channel.close().await {
            debug!(error = %e, "Closing shell channel");
        }
        Ok(())
    }
}
