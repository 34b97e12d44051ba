mod client;
mod connector;
pub mod known_hosts;
mod sftp;
mod shell;

pub use client::SshClient;
pub use connector::RusshConnector;
pub use known_hosts::{HostKeyVerifier, VerifyResult};
pub use sftp::SftpClient;
pub use shell::RusshShell;
