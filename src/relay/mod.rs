//! Terminal relay between a browser WebSocket and an SSH shell

pub mod protocol;
mod service;
mod session;

pub use protocol::{ClientMessage, ControlMessage, WsFrame, decode_client_frame};
pub use service::{TerminalRequest, TerminalService};
pub use session::{EndReason, SessionReport, SessionSettings, TerminalSession};
