use super::types::{Config, HostKeyVerification};
use crate::error::{BridgeError, Result};
use crate::security::CredentialCipher;
use std::net::SocketAddr;
use std::path::Path;
use tracing::warn;

/// Load configuration from a YAML file
///
/// # Errors
///
/// Returns an error if:
/// - The configuration file does not exist
/// - The file cannot be read
/// - The YAML content is invalid or cannot be parsed
/// - The configuration fails validation (e.g., bad keyring, inconsistent timings)
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(BridgeError::ConfigNotFound {
            path: path.display().to_string(),
        });
    }

    // Warn if config file has overly permissive permissions (holds keys and tokens)
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.mode() & 0o777;
            if mode & 0o037 != 0 {
                warn!(
                    config_path = %path.display(),
                    permissions = format!("{mode:04o}"),
                    "Config file holds credential keys and has permissive permissions. \
                     Consider: chmod 640 {}",
                    path.display()
                );
            }
        }
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_saphyr::from_str(&content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Validate the configuration
fn validate_config(config: &Config) -> Result<()> {
    config
        .server
        .listen
        .parse::<SocketAddr>()
        .map_err(|e| BridgeError::ConfigInvalid {
            field: "server.listen".to_string(),
            reason: format!("'{}' is not a socket address: {e}", config.server.listen),
        })?;

    // Builds the keyring once to check every key decodes to a valid AES length
    CredentialCipher::from_config(&config.credentials)?;

    let terminal = &config.terminal;
    if terminal.default_cols == 0 || terminal.default_rows == 0 {
        return Err(BridgeError::ConfigInvalid {
            field: "terminal.default_cols".to_string(),
            reason: "Default terminal size must be positive".to_string(),
        });
    }
    if terminal.ping_interval_seconds == 0 {
        return Err(BridgeError::ConfigInvalid {
            field: "terminal.ping_interval_seconds".to_string(),
            reason: "Ping interval must be positive".to_string(),
        });
    }
    if terminal.read_deadline_seconds <= terminal.ping_interval_seconds {
        return Err(BridgeError::ConfigInvalid {
            field: "terminal.read_deadline_seconds".to_string(),
            reason: format!(
                "Read deadline ({}s) must exceed the ping interval ({}s)",
                terminal.read_deadline_seconds, terminal.ping_interval_seconds
            ),
        });
    }
    if terminal.outbound_queue == 0 {
        return Err(BridgeError::ConfigInvalid {
            field: "terminal.outbound_queue".to_string(),
            reason: "Queue capacity must be positive".to_string(),
        });
    }

    if config.limits.connection_timeout_seconds == 0 {
        return Err(BridgeError::ConfigInvalid {
            field: "limits.connection_timeout_seconds".to_string(),
            reason: "Connection timeout must be positive".to_string(),
        });
    }

    if config.sftp.chunk_size == 0 {
        return Err(BridgeError::ConfigInvalid {
            field: "sftp.chunk_size".to_string(),
            reason: "Chunk size must be positive".to_string(),
        });
    }
    if !config.sftp.default_list_path.starts_with('/') {
        return Err(BridgeError::ConfigInvalid {
            field: "sftp.default_list_path".to_string(),
            reason: "Default list path must be absolute".to_string(),
        });
    }

    for (id, host) in &config.hosts {
        if host.username.is_empty() {
            return Err(BridgeError::ConfigInvalid {
                field: format!("hosts.{id}.username"),
                reason: "Username cannot be empty".to_string(),
            });
        }
        if host.port == 0 {
            return Err(BridgeError::ConfigInvalid {
                field: format!("hosts.{id}.port"),
                reason: "Port cannot be zero".to_string(),
            });
        }
        if host.host_key_verification == HostKeyVerification::Pinned
            && host
                .host_key_fingerprint
                .as_deref()
                .is_none_or(|fp| !fp.starts_with("SHA256:"))
        {
            return Err(BridgeError::ConfigInvalid {
                field: format!("hosts.{id}.host_key_fingerprint"),
                reason: "Pinned verification requires a SHA256: fingerprint".to_string(),
            });
        }
        if host.host_key_verification == HostKeyVerification::Off {
            warn!(
                host_id = id,
                host = %host.name,
                "Host key verification is disabled for this host (development mode)"
            );
        }
    }

    Ok(())
}

/// Get the default config path
#[must_use]
pub fn default_config_path() -> std::path::PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("web-ssh-bridge")
        .join("config.yaml")
}

#[cfg(test)]
#[allow(clippy::needless_raw_string_hashes)]
mod tests {
    use super::*;
    use crate::config::FramingPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // 32 zero bytes, base64
    const KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    fn load(yaml: &str) -> Result<Config> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        load_config(file.path())
    }

    #[test]
    fn test_config_not_found() {
        let result = load_config(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("config.yaml"));
        assert!(path.to_string_lossy().contains("web-ssh-bridge"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load(&format!("credentials:\n  aes_keys: [\"{KEY}\"]\n")).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.terminal.framing, FramingPolicy::Legacy);
        assert_eq!(config.limits.connection_timeout_seconds, 10);
        assert!(config.hosts.is_empty());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let result = load("server:\n  listen: 127.0.0.1:9000\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_keyring_rejected() {
        let result = load("credentials:\n  aes_keys: []\n");
        assert!(
            matches!(result, Err(BridgeError::ConfigInvalid { field, .. }) if field == "credentials.aes_keys")
        );
    }

    #[test]
    fn test_bad_key_length_rejected() {
        // 8 bytes
        let result = load("credentials:\n  aes_keys: [\"AAAAAAAAAAA=\"]\n");
        assert!(
            matches!(result, Err(BridgeError::ConfigInvalid { reason, .. }) if reason.contains("16 or 32"))
        );
    }

    #[test]
    fn test_bad_listen_rejected() {
        let result = load(&format!(
            "server:\n  listen: not-an-address\ncredentials:\n  aes_keys: [\"{KEY}\"]\n"
        ));
        assert!(
            matches!(result, Err(BridgeError::ConfigInvalid { field, .. }) if field == "server.listen")
        );
    }

    #[test]
    fn test_deadline_must_exceed_ping_interval() {
        let result = load(&format!(
            r#"
credentials:
  aes_keys: ["{KEY}"]
terminal:
  ping_interval_seconds: 30
  read_deadline_seconds: 30
"#
        ));
        assert!(
            matches!(result, Err(BridgeError::ConfigInvalid { field, .. }) if field == "terminal.read_deadline_seconds")
        );
    }

    #[test]
    fn test_empty_username_rejected() {
        let result = load(&format!(
            r#"
credentials:
  aes_keys: ["{KEY}"]
hosts:
  7:
    name: db-1
    public_ip: ["203.0.113.7"]
    username: ""
"#
        ));
        assert!(
            matches!(result, Err(BridgeError::ConfigInvalid { field, .. }) if field == "hosts.7.username")
        );
    }

    #[test]
    fn test_pinned_requires_fingerprint() {
        let result = load(&format!(
            r#"
credentials:
  aes_keys: ["{KEY}"]
hosts:
  1:
    name: web-1
    username: root
    host_key_verification: pinned
"#
        ));
        assert!(
            matches!(result, Err(BridgeError::ConfigInvalid { field, .. }) if field.contains("host_key_fingerprint"))
        );
    }

    #[test]
    fn test_full_host_record() {
        let config = load(&format!(
            r#"
credentials:
  aes_keys: ["{KEY}"]
hosts:
  42:
    name: web-42
    public_ip: ["203.0.113.42"]
    private_ip: ["10.0.0.42", ""]
    port: 2222
    username: deploy
    auth_type: both
    password: "Zm9v"
    host_key_verification: pinned
    host_key_fingerprint: "SHA256:abc"
"#
        ))
        .unwrap();
        let host = &config.hosts[&42];
        assert_eq!(host.port, 2222);
        assert_eq!(host.private_ip.len(), 2);
        assert_eq!(host.auth_type, "both");
        assert_eq!(host.host_key_verification, HostKeyVerification::Pinned);
    }

    #[test]
    fn test_invalid_yaml_syntax() {
        let result = load("credentials: [unclosed");
        assert!(result.is_err());
    }
}
