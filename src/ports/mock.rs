//! In-memory port implementations for unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use tokio::sync::mpsc;
use zeroize::Zeroizing;

use super::{HostRegistry, RemoteEntry, RemoteFs, ShellChannel, SshClientTrait, SshConnector};
use crate::config::{CredentialsConfig, LimitsConfig};
use crate::domain::{
    ConnectTarget, ConnectionStatus, HostConnectionSpec, HostKeyPolicy, PtyRequest, TerminalSize,
};
use crate::error::{BridgeError, Result};
use crate::security::CredentialCipher;

// ============== Shell ==============

/// What the relay did to a [`MockShell`]
#[derive(Debug, Default)]
pub struct ShellLog {
    pub input: Vec<u8>,
    pub window_changes: Vec<TerminalSize>,
    pub close_calls: usize,
    pub closed: bool,
}

pub struct MockShell {
    output: mpsc::UnboundedReceiver<Result<Bytes>>,
    echo: Option<mpsc::UnboundedSender<Result<Bytes>>>,
    log: Arc<Mutex<ShellLog>>,
    fail_input: bool,
}

/// Test-side handle: push output, then inspect the log
pub struct MockShellHandle {
    pub output: mpsc::UnboundedSender<Result<Bytes>>,
    pub log: Arc<Mutex<ShellLog>>,
}

impl MockShell {
    #[must_use]
    pub fn new() -> (Self, MockShellHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(ShellLog::default()));
        (
            Self {
                output: rx,
                echo: None,
                log: Arc::clone(&log),
                fail_input: false,
            },
            MockShellHandle { output: tx, log },
        )
    }

    /// Every input chunk is echoed back as output
    #[must_use]
    pub fn with_echo(mut self, handle: &MockShellHandle) -> Self {
        self.echo = Some(handle.output.clone());
        self
    }

    /// Writes to stdin fail
    #[must_use]
    pub const fn failing_input(mut self) -> Self {
        self.fail_input = true;
        self
    }
}

#[async_trait]
impl ShellChannel for MockShell {
    async fn recv(&mut self) -> Result<Option<Bytes>> {
        if self.log.lock().unwrap().closed {
            return Ok(None);
        }
        match self.output.recv().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn send_input(&mut self, data: &[u8]) -> Result<()> {
        if self.fail_input {
            return Err(BridgeError::relay_io("ssh stdin", "broken pipe"));
        }
        self.log.lock().unwrap().input.extend_from_slice(data);
        if let Some(echo) = &self.echo {
            let _ = echo.send(Ok(Bytes::copy_from_slice(data)));
        }
        Ok(())
    }

    async fn window_change(&mut self, size: TerminalSize) -> Result<()> {
        self.log.lock().unwrap().window_changes.push(size);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.close_calls += 1;
        log.closed = true;
        drop(log);
        self.echo = None;
        Ok(())
    }
}

// ============== Remote filesystem ==============

#[derive(Debug, Default)]
pub struct FsState {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    pub close_calls: usize,
}

#[derive(Clone)]
pub struct MockRemoteFs {
    state: Arc<Mutex<FsState>>,
}

impl MockRemoteFs {
    #[must_use]
    pub fn new(state: Arc<Mutex<FsState>>) -> Self {
        Self { state }
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

fn not_found(op: &str, path: &str) -> BridgeError {
    BridgeError::sftp(op, path, "No such file")
}

#[async_trait]
impl RemoteFs for MockRemoteFs {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let state = self.state.lock().unwrap();
        if !state.dirs.contains(path) {
            return Err(not_found("list", path));
        }
        let name_of = |p: &str| p.rsplit('/').next().unwrap_or(p).to_string();
        let mut entries: Vec<RemoteEntry> = state
            .dirs
            .iter()
            .filter(|d| d.as_str() != path && parent_of(d) == path)
            .map(|d| RemoteEntry {
                name: name_of(d),
                size: 4096,
                is_dir: true,
                is_symlink: false,
                permissions: 0o755,
                mtime: Some(0),
            })
            .collect();
        entries.extend(
            state
                .files
                .iter()
                .filter(|(f, _)| parent_of(f) == path)
                .map(|(f, data)| RemoteEntry {
                    name: name_of(f),
                    size: data.len() as u64,
                    is_dir: false,
                    is_symlink: false,
                    permissions: 0o644,
                    mtime: Some(0),
                }),
        );
        Ok(entries)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
        let data = tokio::fs::read(local)
            .await
            .map_err(|e| BridgeError::sftp("upload", remote, e))?;
        let len = data.len() as u64;
        self.state
            .lock()
            .unwrap()
            .files
            .insert(remote.to_string(), data);
        Ok(len)
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<u64> {
        let data = self
            .state
            .lock()
            .unwrap()
            .files
            .get(remote)
            .cloned()
            .ok_or_else(|| not_found("download", remote))?;
        tokio::fs::write(local, &data)
            .await
            .map_err(|e| BridgeError::sftp("download", remote, e))?;
        Ok(data.len() as u64)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.files.remove(path).is_some() {
            return Ok(());
        }
        if state.dirs.contains(path) {
            let has_children = state.files.keys().any(|f| parent_of(f) == path)
                || state.dirs.iter().any(|d| d != path && parent_of(d) == path);
            if has_children {
                return Err(BridgeError::sftp("delete", path, "Directory not empty"));
            }
            state.dirs.remove(path);
            return Ok(());
        }
        Err(not_found("delete", path))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.dirs.contains(path) || state.files.contains_key(path) {
            return Err(BridgeError::sftp("mkdir", path, "Failure"));
        }
        state.dirs.insert(path.to_string());
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let data = state
            .files
            .remove(from)
            .ok_or_else(|| not_found("rename", from))?;
        state.files.insert(to.to_string(), data);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().close_calls += 1;
        Ok(())
    }
}

// ============== Connector ==============

#[derive(Default)]
pub struct MockConnector {
    shells: Mutex<VecDeque<MockShell>>,
    connect_error: Mutex<Option<BridgeError>>,
    shell_error: Mutex<Option<BridgeError>>,
    sftp_error: Mutex<Option<BridgeError>>,
    hang_connect: AtomicBool,
    hang_shell: AtomicBool,
    pub fs: Arc<Mutex<FsState>>,
    pub connects: Mutex<Vec<String>>,
    pub ptys: Arc<Mutex<Vec<PtyRequest>>>,
    pub client_closes: Arc<AtomicUsize>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        let connector = Self::default();
        connector.fs.lock().unwrap().dirs.insert("/".to_string());
        connector
    }

    /// Queue a shell for the next `open_shell`
    pub fn push_shell(&self, shell: MockShell) {
        self.shells.lock().unwrap().push_back(shell);
    }

    pub fn fail_connect(&self, error: BridgeError) {
        *self.connect_error.lock().unwrap() = Some(error);
    }

    pub fn fail_shell(&self, error: BridgeError) {
        *self.shell_error.lock().unwrap() = Some(error);
    }

    pub fn fail_sftp(&self, error: BridgeError) {
        *self.sftp_error.lock().unwrap() = Some(error);
    }

    /// The server accepts TCP but never finishes the handshake
    pub fn hang_connect(&self) {
        self.hang_connect.store(true, Ordering::SeqCst);
    }

    /// The server never answers the pty or shell request
    pub fn hang_shell(&self) {
        self.hang_shell.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.client_closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SshConnector for MockConnector {
    type Client = MockClient;

    async fn connect(&self, target: &ConnectTarget, _limits: &LimitsConfig) -> Result<MockClient> {
        self.connects.lock().unwrap().push(target.endpoint());
        if let Some(error) = self.connect_error.lock().unwrap().take() {
            return Err(error);
        }
        if self.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(MockClient {
            label: target.endpoint(),
            shell: Mutex::new(self.shells.lock().unwrap().pop_front()),
            shell_error: Mutex::new(self.shell_error.lock().unwrap().take()),
            sftp_error: Mutex::new(self.sftp_error.lock().unwrap().take()),
            hang_shell: self.hang_shell.load(Ordering::SeqCst),
            fs: Arc::clone(&self.fs),
            ptys: Arc::clone(&self.ptys),
            closes: Arc::clone(&self.client_closes),
        })
    }
}

pub struct MockClient {
    label: String,
    shell: Mutex<Option<MockShell>>,
    shell_error: Mutex<Option<BridgeError>>,
    sftp_error: Mutex<Option<BridgeError>>,
    hang_shell: bool,
    fs: Arc<Mutex<FsState>>,
    ptys: Arc<Mutex<Vec<PtyRequest>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl SshClientTrait for MockClient {
    type Shell = MockShell;
    type Files = MockRemoteFs;

    async fn open_shell(&self, pty: &PtyRequest) -> Result<MockShell> {
        self.ptys.lock().unwrap().push(pty.clone());
        if let Some(error) = self.shell_error.lock().unwrap().take() {
            return Err(error);
        }
        if self.hang_shell {
            std::future::pending::<()>().await;
        }
        self.shell
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BridgeError::session_setup("connecting", "no shell queued"))
    }

    async fn open_sftp(&self) -> Result<MockRemoteFs> {
        if let Some(error) = self.sftp_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(MockRemoteFs::new(Arc::clone(&self.fs)))
    }

    fn host_name(&self) -> &str {
        &self.label
    }

    fn close(self) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

// ============== Registry ==============

#[derive(Default)]
pub struct MockRegistry {
    hosts: HashMap<u64, HostConnectionSpec>,
    pub statuses: Mutex<Vec<(u64, ConnectionStatus)>>,
}

impl MockRegistry {
    #[must_use]
    pub fn with_host(mut self, spec: HostConnectionSpec) -> Self {
        self.hosts.insert(spec.host_id, spec);
        self
    }

    #[must_use]
    pub fn statuses(&self) -> Vec<(u64, ConnectionStatus)> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostRegistry for MockRegistry {
    async fn resolve(&self, host_id: u64) -> Result<HostConnectionSpec> {
        self.hosts
            .get(&host_id)
            .cloned()
            .ok_or(BridgeError::UnknownHost { host_id })
    }

    async fn record_status(&self, host_id: u64, status: ConnectionStatus) {
        self.statuses.lock().unwrap().push((host_id, status));
    }
}

// ============== Fixtures ==============

#[must_use]
pub fn test_cipher() -> CredentialCipher {
    let key = base64::engine::general_purpose::STANDARD.encode([42u8; 32]);
    CredentialCipher::from_config(&CredentialsConfig {
        aes_keys: vec![Zeroizing::new(key)],
    })
    .unwrap()
}

/// Password-authenticated host whose secret is sealed with [`test_cipher`]
#[must_use]
pub fn password_spec(host_id: u64) -> HostConnectionSpec {
    HostConnectionSpec {
        host_id,
        name: format!("host-{host_id}"),
        public_ip: vec!["203.0.113.10".to_string()],
        private_ip: vec!["10.0.0.10".to_string()],
        port: 22,
        username: "root".to_string(),
        auth_type: "password".to_string(),
        encrypted_password: Some(test_cipher().encrypt("hunter2").unwrap()),
        encrypted_private_key: None,
        host_key: HostKeyPolicy::AcceptNew,
    }
}
