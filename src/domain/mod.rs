//! Domain module - Core business logic
//!
//! Host records, target resolution and the terminal vocabulary shared by the
//! relay and the SSH adapter.

pub mod host;
pub mod registry;
pub mod resolver;
pub mod terminal;

pub use host::{
    AuthType, ConnectTarget, ConnectionStatus, HostConnectionSpec, HostKeyPolicy, IpPreference,
    SshAuth, select_target_ip,
};
pub use registry::{ConfigHostRegistry, StatusEntry};
pub use resolver::resolve_target;
pub use terminal::{PtyRequest, SessionState, TerminalSize};
