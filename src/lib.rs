#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod files;
pub mod http;
pub mod ports;
pub mod relay;
pub mod security;
pub mod ssh;

pub use config::Config;
pub use error::{BridgeError, ErrorKind, Result};
pub use files::{FileInfo, SftpBridge};
pub use http::{AppState, router};
pub use relay::{TerminalRequest, TerminalService, TerminalSession};
pub use security::{CredentialCipher, StaticTokenVerifier, TokenVerifier};
pub use ssh::RusshConnector;
