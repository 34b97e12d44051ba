use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::TerminalSize;
use crate::error::Result;

/// An interactive shell running on a PTY.
#[async_trait]
pub trait ShellChannel: Send + 'static {
    /// Next chunk of output (stdout and stderr merged).
    ///
    /// `Ok(None)` means the remote side sent EOF or closed the channel.
    /// Must be cancel safe: the relay polls it inside `select!`.
    async fn recv(&mut self) -> Result<Option<Bytes>>;

    /// Write bytes to the shell's stdin
    async fn send_input(&mut self, data: &[u8]) -> Result<()>;

    /// Send one window-change request
    async fn window_change(&mut self, size: TerminalSize) -> Result<()>;

    /// Close the channel. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}
