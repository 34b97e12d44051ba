use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid { field: String, reason: String },

    #[error("Unsupported auth method for host {host_id}: {method}")]
    UnsupportedAuth { host_id: u64, method: String },

    // SSH errors
    #[error("SSH connection failed to {host}: {reason}")]
    SshConnection { host: String, reason: String },

    #[error("SSH host key mismatch for {host}: expected {expected}, got {actual}")]
    SshHostKeyMismatch {
        host: String,
        expected: String,
        actual: String,
    },

    #[error("SSH host key unknown for {host} (fingerprint: {fingerprint})")]
    SshHostKeyUnknown { host: String, fingerprint: String },

    #[error("SSH authentication failed for {user}@{host}")]
    SshAuth { user: String, host: String },

    #[error("SSH private key could not be parsed for {user}@{host}")]
    SshKeyInvalid { user: String, host: String },

    // Terminal session errors
    #[error("Session setup failed at {stage}: {reason}")]
    SessionSetup { stage: String, reason: String },

    #[error("Relay I/O error on {leg}: {reason}")]
    RelayIo { leg: String, reason: String },

    // SFTP errors
    #[error("SFTP {op} failed for {path}: {reason}")]
    Sftp {
        op: String,
        path: String,
        reason: String,
    },

    #[error("Invalid remote path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    // Credential errors
    #[error("Credential error: {0}")]
    Credential(String),

    // Boundary errors
    #[error("Unknown host: {host_id}")]
    UnknownHost { host_id: u64 },

    #[error("No usable address for host {host_id}")]
    NoAddress { host_id: u64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

/// Coarse classification surfaced to clients alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Connect,
    SessionSetup,
    Io,
    Resource,
    Credential,
    NotFound,
    Unauthorized,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Connect => "connect",
            Self::SessionSetup => "session_setup",
            Self::Io => "io",
            Self::Resource => "resource",
            Self::Credential => "credential",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::ConfigNotFound { .. }
            | Self::ConfigInvalid { .. }
            | Self::UnsupportedAuth { .. }
            | Self::InvalidPath { .. }
            | Self::Json(_)
            | Self::Yaml(_) => ErrorKind::Configuration,
            Self::SshConnection { .. }
            | Self::SshHostKeyMismatch { .. }
            | Self::SshHostKeyUnknown { .. }
            | Self::SshAuth { .. }
            | Self::SshKeyInvalid { .. } => ErrorKind::Connect,
            Self::SessionSetup { .. } => ErrorKind::SessionSetup,
            Self::RelayIo { .. } | Self::Io(_) => ErrorKind::Io,
            Self::Sftp { .. } => ErrorKind::Resource,
            Self::Credential(_) => ErrorKind::Credential,
            Self::UnknownHost { .. } | Self::NoAddress { .. } => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
        }
    }

    pub fn session_setup(stage: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SessionSetup {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    pub fn relay_io(leg: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::RelayIo {
            leg: leg.into(),
            reason: reason.to_string(),
        }
    }

    pub fn sftp(
        op: impl Into<String>,
        path: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Sftp {
            op: op.into(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
