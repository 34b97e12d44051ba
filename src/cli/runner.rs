//! CLI runner functions
//!
//! Wire the configuration into the services and run the requested command.

use std::fmt::Write as FmtWrite;
use std::io::Read;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::domain::ConfigHostRegistry;
use crate::error::{BridgeError, Result};
use crate::files::SftpBridge;
use crate::http::{AppState, router, serve};
use crate::ports::HostRegistry;
use crate::relay::TerminalService;
use crate::security::{CredentialCipher, StaticTokenVerifier};
use crate::ssh::{HostKeyVerifier, RusshConnector};

/// Build the application state from configuration.
///
/// The concrete registry is returned as well so the caller can read the
/// recorded connection statuses.
///
/// # Errors
///
/// Returns `ConfigInvalid` if the keyring cannot be built.
pub fn build_state(
    config: &Config,
) -> Result<(AppState<RusshConnector>, Arc<ConfigHostRegistry>)> {
    let cipher = Arc::new(CredentialCipher::from_config(&config.credentials)?);
    let registry = Arc::new(ConfigHostRegistry::new(config.hosts.clone()));
    let shared_registry: Arc<dyn HostRegistry> = registry.clone();

    let known_hosts = HostKeyVerifier::new(config.ssh.known_hosts_path.as_deref());
    let connector = Arc::new(RusshConnector::new(known_hosts, config.sftp.chunk_size));

    let terminal = TerminalService::new(
        Arc::clone(&connector),
        Arc::clone(&shared_registry),
        Arc::clone(&cipher),
        config.limits.clone(),
        config.terminal.clone(),
    );
    let files = SftpBridge::new(
        connector,
        shared_registry,
        cipher,
        config.limits.clone(),
        &config.sftp,
    );
    let tokens: Vec<&str> = config.server.tokens.iter().map(|t| t.as_str()).collect();

    let state = AppState {
        terminal: Arc::new(terminal),
        files: Arc::new(files),
        verifier: Arc::new(StaticTokenVerifier::new(&tokens)),
    };
    Ok((state, registry))
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the state cannot be built or the listener fails.
pub async fn run_serve(config: Config, listen: Option<String>) -> Result<()> {
    let listen = listen.unwrap_or_else(|| config.server.listen.clone());
    let (state, registry) = build_state(&config)?;
    let app = router(state, config.sftp.max_upload_bytes);

    let listener = TcpListener::bind(&listen).await?;
    info!(
        listen = %listen,
        hosts = config.hosts.len(),
        framing = ?config.terminal.framing,
        "Relay ready"
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                trigger.cancel();
            }
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });

    serve(listener, app, shutdown).await?;

    let mut statuses: Vec<_> = registry.statuses().await.into_iter().collect();
    statuses.sort_by_key(|(host_id, _)| *host_id);
    for (host_id, entry) in statuses {
        info!(host_id, status = ?entry.status, at = %entry.at, "Last connection status");
    }
    Ok(())
}

/// Encrypt the secret read from `input` with key `key_index`.
///
/// Trailing line breaks are stripped so `echo secret |` works.
///
/// # Errors
///
/// Returns `Credential` if the input is empty or the key index is out of
/// range, `Io` if the input cannot be read.
pub fn encrypt_secret(config: &Config, key_index: usize, mut input: impl Read) -> Result<String> {
    let cipher = CredentialCipher::from_config(&config.credentials)?;
    let mut raw = Zeroizing::new(String::new());
    input.read_to_string(&mut raw)?;
    let secret = raw.trim_end_matches(['\r', '\n']);
    if secret.is_empty() {
        return Err(BridgeError::Credential("no secret on stdin".to_string()));
    }
    cipher.encrypt_with(key_index, secret)
}

/// `encrypt`: stdin to ciphertext on stdout
///
/// # Errors
///
/// See [`encrypt_secret`].
pub fn run_encrypt(config: &Config, key_index: usize) -> Result<()> {
    let sealed = encrypt_secret(config, key_index, std::io::stdin().lock())?;
    println!("{sealed}");
    Ok(())
}

const fn stored(secret: Option<&String>) -> &'static str {
    if secret.is_some() { "stored" } else { "-" }
}

/// Human-readable summary of the configuration, without secrets.
#[must_use]
pub fn render_status(config: &Config) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Web SSH Bridge Status");
    let _ = writeln!(out, "=====================\n");

    let _ = writeln!(out, "Listen: {}", config.server.listen);
    let _ = writeln!(out, "Accepted tokens: {}", config.server.tokens.len());
    let _ = writeln!(out, "Credential keys: {}", config.credentials.aes_keys.len());

    let _ = writeln!(out, "\nTerminal:");
    let _ = writeln!(out, "  Type: {}", config.terminal.term);
    let _ = writeln!(
        out,
        "  Default size: {}x{}",
        config.terminal.default_cols, config.terminal.default_rows
    );
    let _ = writeln!(
        out,
        "  Ping every {}s, read deadline {}s",
        config.terminal.ping_interval_seconds, config.terminal.read_deadline_seconds
    );
    let _ = writeln!(out, "  Framing: {:?}", config.terminal.framing);
    let _ = writeln!(
        out,
        "  Connect timeout: {}s",
        config.limits.connection_timeout_seconds
    );

    let _ = writeln!(out, "\nConfigured Hosts ({}):", config.hosts.len());
    let _ = writeln!(out, "{:-<60}", "");

    if config.hosts.is_empty() {
        let _ = writeln!(out, "  (no hosts configured)");
    }
    let mut ids: Vec<&u64> = config.hosts.keys().collect();
    ids.sort();
    for id in ids {
        let host = &config.hosts[id];
        let _ = writeln!(out, "\n  [{id}] {}:", host.name);
        let _ = writeln!(out, "    Public: {}", host.public_ip.join(", "));
        let _ = writeln!(out, "    Private: {}", host.private_ip.join(", "));
        let _ = writeln!(out, "    Port: {}", host.port);
        let _ = writeln!(out, "    User: {}", host.username);
        let auth = if host.auth_type.trim().is_empty() {
            "(auto)"
        } else {
            host.auth_type.as_str()
        };
        let _ = writeln!(out, "    Auth: {auth}");
        let _ = writeln!(
            out,
            "    Password: {}, private key: {}",
            stored(host.password.as_ref()),
            stored(host.private_key.as_ref())
        );
        let _ = writeln!(out, "    Host Key: {:?}", host.host_key_verification);
    }
    out
}

/// `status`
pub fn run_status(config: &Config) {
    print!("{}", render_status(config));
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    fn config(extra: &str) -> Config {
        let yaml = format!(
            "credentials:\n  aes_keys:\n    - \"{KEY}\"\n    - \"AQEBAQEBAQEBAQEBAQEBAQ==\"\n{extra}"
        );
        serde_saphyr::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_encrypt_secret_round_trip() {
        let cfg = config("");
        let sealed = encrypt_secret(&cfg, 0, "hunter2\n".as_bytes()).unwrap();
        let cipher = CredentialCipher::from_config(&cfg.credentials).unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap().as_str(), "hunter2");
    }

    #[test]
    fn test_encrypt_secret_second_key() {
        let cfg = config("");
        let sealed = encrypt_secret(&cfg, 1, "pw".as_bytes()).unwrap();
        let cipher = CredentialCipher::from_config(&cfg.credentials).unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap().as_str(), "pw");
        assert!(encrypt_secret(&cfg, 5, "pw".as_bytes()).is_err());
    }

    #[test]
    fn test_encrypt_rejects_empty_input() {
        let cfg = config("");
        assert!(matches!(
            encrypt_secret(&cfg, 0, "\n".as_bytes()),
            Err(BridgeError::Credential(_))
        ));
    }

    #[test]
    fn test_render_status_hides_secrets() {
        let cfg = config(
            "server:\n  tokens: [\"tok-1\"]\nhosts:\n  42:\n    name: db-1\n    public_ip: [\"203.0.113.5\"]\n    username: ops\n    auth_type: password\n    password: \"c2VhbGVkLXNlY3JldC1ibG9i\"\n",
        );

        let status = render_status(&cfg);

        assert!(status.contains("[42] db-1"));
        assert!(status.contains("Public: 203.0.113.5"));
        assert!(status.contains("Password: stored, private key: -"));
        assert!(status.contains("Accepted tokens: 1"));
        assert!(!status.contains("c2VhbGVkLXNlY3JldC1ibG9i"));
        assert!(!status.contains("tok-1"));
        assert!(!status.contains(KEY));
    }

    #[test]
    fn test_render_status_empty() {
        assert!(render_status(&config("")).contains("(no hosts configured)"));
    }

    #[tokio::test]
    async fn test_build_state() {
        let (_state, registry) = build_state(&config("")).unwrap();
        assert!(registry.statuses().await.is_empty());

        let mut bad = config("");
        bad.credentials.aes_keys = vec![Zeroizing::new("short".to_string())];
        assert!(matches!(
            build_state(&bad),
            Err(BridgeError::ConfigInvalid { .. })
        ));
    }
}
