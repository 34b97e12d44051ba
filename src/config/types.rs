use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub terminal: TerminalConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub sftp: SftpConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    /// Managed hosts keyed by their numeric registry id.
    #[serde(default)]
    pub hosts: HashMap<u64, HostRecord>,
}

/// HTTP / WebSocket listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Accepted bearer tokens. Empty means any non-empty token passes.
    #[serde(default, skip_serializing)]
    pub tokens: Vec<Zeroizing<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            tokens: Vec::new(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

/// Keyring used to decrypt host secrets.
///
/// Keys are base64-encoded AES keys (16 or 32 bytes). Decryption tries them
/// in order so older ciphertexts keep working after a rotation; encryption
/// always uses the first one.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    #[serde(skip_serializing)]
    pub aes_keys: Vec<Zeroizing<String>>,
}

/// How text frames that are not control envelopes are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingPolicy {
    /// Forward unrecognized text frames to the shell as input (default)
    #[default]
    Legacy,
    /// Drop unrecognized text frames; input must arrive as binary frames
    /// or `{"type":"input"}` envelopes
    Strict,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TerminalConfig {
    #[serde(default = "default_term")]
    pub term: String,

    #[serde(default = "default_cols")]
    pub default_cols: u32,

    #[serde(default = "default_rows")]
    pub default_rows: u32,

    /// Interval between server-initiated WebSocket pings
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,

    /// Maximum silence tolerated on the WebSocket before the session ends
    #[serde(default = "default_read_deadline")]
    pub read_deadline_seconds: u64,

    #[serde(default)]
    pub framing: FramingPolicy,

    /// Capacity of the queue feeding the WebSocket writer
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            term: default_term(),
            default_cols: default_cols(),
            default_rows: default_rows(),
            ping_interval_seconds: default_ping_interval(),
            read_deadline_seconds: default_read_deadline(),
            framing: FramingPolicy::default(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

fn default_term() -> String {
    "xterm-256color".to_string()
}

const fn default_cols() -> u32 {
    80
}

const fn default_rows() -> u32 {
    24
}

const fn default_ping_interval() -> u64 {
    30
}

const fn default_read_deadline() -> u64 {
    60
}

const fn default_outbound_queue() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,

    #[serde(default = "default_keepalive")]
    pub keepalive_interval_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connection_timeout_seconds: default_connection_timeout(),
            keepalive_interval_seconds: default_keepalive(),
        }
    }
}

const fn default_connection_timeout() -> u64 {
    10
}

const fn default_keepalive() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SftpConfig {
    /// Directory listed when the caller does not supply a path
    #[serde(default = "default_list_path")]
    pub default_list_path: String,

    /// Where upload and download staging files are created
    /// (system temp dir when unset)
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            default_list_path: default_list_path(),
            staging_dir: None,
            chunk_size: default_chunk_size(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_list_path() -> String {
    "/home".to_string()
}

const fn default_chunk_size() -> usize {
    32 * 1024
}

const fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SshConfig {
    /// `known_hosts` file used by the `strict` and `accept_new` policies
    /// (defaults to `~/.ssh/known_hosts`)
    #[serde(default)]
    pub known_hosts_path: Option<String>,
}

/// A managed host as handed over by the asset registry.
///
/// `password` and `private_key` hold ciphertexts produced by
/// `web-ssh-bridge encrypt`; they are only decrypted for the duration of a
/// connection attempt.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostRecord {
    pub name: String,

    #[serde(default)]
    pub public_ip: Vec<String>,

    #[serde(default)]
    pub private_ip: Vec<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    /// `password`, `privatekey`, `both` or empty
    #[serde(default)]
    pub auth_type: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub private_key: Option<String>,

    #[serde(default)]
    pub host_key_verification: HostKeyVerification,

    /// Expected `SHA256:` fingerprint for the `pinned` policy
    #[serde(default)]
    pub host_key_fingerprint: Option<String>,
}

const fn default_port() -> u16 {
    22
}

/// Host key verification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Trust on first use: record unknown hosts, reject changed keys (default)
    #[default]
    #[serde(alias = "acceptnew")]
    AcceptNew,
    /// Reject hosts missing from `known_hosts`
    Strict,
    /// Accept only the fingerprint configured on the host record
    Pinned,
    /// Accept every key (development only)
    Off,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============== HostKeyVerification Tests ==============

    #[test]
    fn test_host_key_verification_default() {
        assert_eq!(HostKeyVerification::default(), HostKeyVerification::AcceptNew);
    }

    #[test]
    fn test_host_key_verification_serialization() {
        assert_eq!(
            serde_json::to_string(&HostKeyVerification::AcceptNew).unwrap(),
            "\"accept_new\""
        );
        assert_eq!(
            serde_json::to_string(&HostKeyVerification::Pinned).unwrap(),
            "\"pinned\""
        );
        assert_eq!(
            serde_json::to_string(&HostKeyVerification::Off).unwrap(),
            "\"off\""
        );
    }

    #[test]
    fn test_host_key_verification_alias() {
        let mode: HostKeyVerification = serde_json::from_str("\"acceptnew\"").unwrap();
        assert_eq!(mode, HostKeyVerification::AcceptNew);
    }

    // ============== Defaults ==============

    #[test]
    fn test_terminal_defaults() {
        let terminal = TerminalConfig::default();
        assert_eq!(terminal.term, "xterm-256color");
        assert_eq!((terminal.default_cols, terminal.default_rows), (80, 24));
        assert_eq!(terminal.ping_interval_seconds, 30);
        assert_eq!(terminal.read_deadline_seconds, 60);
        assert_eq!(terminal.framing, FramingPolicy::Legacy);
    }

    #[test]
    fn test_limits_defaults() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.connection_timeout_seconds, 10);
        assert_eq!(limits.keepalive_interval_seconds, 30);
    }

    #[test]
    fn test_sftp_defaults() {
        let sftp = SftpConfig::default();
        assert_eq!(sftp.default_list_path, "/home");
        assert!(sftp.staging_dir.is_none());
        assert_eq!(sftp.chunk_size, 32 * 1024);
    }

    #[test]
    fn test_framing_policy_deserialization() {
        let strict: FramingPolicy = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(strict, FramingPolicy::Strict);
        assert!(serde_json::from_str::<FramingPolicy>("\"sniff\"").is_err());
    }

    // ============== HostRecord Tests ==============

    #[test]
    fn test_host_record_minimal() {
        let json = r#"{"name": "web-1", "username": "root"}"#;
        let host: HostRecord = serde_json::from_str(json).unwrap();
        assert_eq!(host.port, 22);
        assert!(host.public_ip.is_empty());
        assert!(host.auth_type.is_empty());
        assert_eq!(host.host_key_verification, HostKeyVerification::AcceptNew);
    }

    #[test]
    fn test_server_tokens_not_serialized() {
        let server = ServerConfig {
            listen: "0.0.0.0:9000".to_string(),
            tokens: vec![Zeroizing::new("s3cret".to_string())],
        };
        let json = serde_json::to_string(&server).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(json.contains("0.0.0.0:9000"));
    }
}
