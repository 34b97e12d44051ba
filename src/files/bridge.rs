//! SFTP Bridge
//!
//! Every operation dials the host, opens a fresh SFTP channel, runs, and
//! closes both the channel and the connection before returning, on success
//! and on failure alike. Nothing is pooled or shared between calls.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::info::{FileInfo, join_remote, sort_listing};
use super::staging::Staging;
use crate::config::{LimitsConfig, SftpConfig};
use crate::domain::{IpPreference, resolve_target};
use crate::error::{BridgeError, Result};
use crate::ports::{HostRegistry, RemoteFs, SshClientTrait, SshConnector};
use crate::security::CredentialCipher;

/// Reject remote paths that are empty, contain NUL or climb with `..`.
///
/// # Errors
///
/// Returns `InvalidPath`.
pub fn validate_remote_path(path: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(BridgeError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        })
    };
    if path.trim().is_empty() {
        return invalid("path is empty");
    }
    if path.contains('\0') {
        return invalid("path contains NUL");
    }
    if path.split('/').any(|part| part == "..") {
        return invalid("parent directory components are not allowed");
    }
    Ok(())
}

/// Remote destination for an uploaded file: `dir` joined with the final
/// component of the client-supplied file name.
///
/// # Errors
///
/// Returns `InvalidPath` if no usable file name remains.
pub fn upload_target(dir: &str, file_name: &str) -> Result<String> {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(BridgeError::InvalidPath {
            path: file_name.to_string(),
            reason: "upload needs a file name".to_string(),
        });
    }
    let target = join_remote(dir, name);
    validate_remote_path(&target)?;
    Ok(target)
}

/// A downloaded file waiting in the staging area
pub struct StagedDownload {
    path: TempPath,
    pub size: u64,
}

impl StagedDownload {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the staged bytes. The staging file is removed once the
    /// stream is dropped.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the staged file cannot be opened.
    pub async fn into_stream(self) -> Result<impl Stream<Item = std::io::Result<Bytes>> + Send> {
        let file = File::open(&self.path).await?;
        let guard = self.path;
        Ok(ReaderStream::new(file).map(move |chunk| {
            let _ = &guard;
            chunk
        }))
    }
}

/// Connection and channel held for the span of one operation
struct Lease<Cl: SshClientTrait> {
    client: Cl,
    fs: Cl::Files,
}

pub struct SftpBridge<C: SshConnector> {
    connector: Arc<C>,
    registry: Arc<dyn HostRegistry>,
    cipher: Arc<CredentialCipher>,
    limits: LimitsConfig,
    staging: Staging,
    default_list_path: String,
}

impl<C: SshConnector> SftpBridge<C> {
    pub fn new(
        connector: Arc<C>,
        registry: Arc<dyn HostRegistry>,
        cipher: Arc<CredentialCipher>,
        limits: LimitsConfig,
        sftp: &SftpConfig,
    ) -> Self {
        Self {
            connector,
            registry,
            cipher,
            limits,
            staging: Staging::new(sftp.staging_dir.as_deref()),
            default_list_path: sftp.default_list_path.clone(),
        }
    }

    #[must_use]
    pub fn default_list_path(&self) -> &str {
        &self.default_list_path
    }

    #[must_use]
    pub const fn staging(&self) -> &Staging {
        &self.staging
    }

    async fn acquire(&self, host_id: u64) -> Result<Lease<C::Client>> {
        let spec = self.registry.resolve(host_id).await?;
        let target = resolve_target(&spec, IpPreference::Auto, &self.cipher)?;
        let client = self.connector.connect(&target, &self.limits).await?;
        drop(target);

        match client.open_sftp().await {
            Ok(fs) => Ok(Lease { client, fs }),
            Err(e) => {
                if let Err(close_err) = client.close().await {
                    warn!(host_id, error = %close_err, "Closing SSH client after failed SFTP open");
                }
                Err(e)
            }
        }
    }

    async fn release(&self, lease: Lease<C::Client>, host_id: u64) {
        let Lease { client, fs } = lease;
        if let Err(e) = fs.close().await {
            debug!(host_id, error = %e, "Closing SFTP channel");
        }
        if let Err(e) = client.close().await {
            warn!(host_id, error = %e, "Closing SSH client");
        }
    }

    fn finish<T>(host_id: u64, op: &str, path: &str, result: &Result<T>) {
        match result {
            Ok(_) => info!(host_id, op, path = %path, "SFTP operation completed"),
            Err(e) => warn!(host_id, op, path = %path, error = %e, "SFTP operation failed"),
        }
    }

    /// List a remote directory, directories first.
    ///
    /// # Errors
    ///
    /// `InvalidPath` before dialing; connect errors; `Sftp` for the listing.
    pub async fn list(&self, host_id: u64, path: &str) -> Result<Vec<FileInfo>> {
        validate_remote_path(path)?;
        let lease = self.acquire(host_id).await?;
        let result = lease.fs.list(path).await;
        self.release(lease, host_id).await;
        Self::finish(host_id, "list", path, &result);

        let mut listing: Vec<FileInfo> = result?
            .into_iter()
            .map(|entry| FileInfo::from_entry(path, entry))
            .collect();
        sort_listing(&mut listing);
        Ok(listing)
    }

    /// Copy a local file to `remote`. Returns the bytes written.
    ///
    /// # Errors
    ///
    /// `InvalidPath` before dialing; connect errors; `Sftp` for the transfer.
    pub async fn upload(&self, host_id: u64, local: &Path, remote: &str) -> Result<u64> {
        validate_remote_path(remote)?;
        let lease = self.acquire(host_id).await?;
        let result = lease.fs.upload(local, remote).await;
        self.release(lease, host_id).await;
        Self::finish(host_id, "upload", remote, &result);
        result
    }

    /// Copy `remote` into a local file. Returns the bytes read.
    ///
    /// # Errors
    ///
    /// `InvalidPath` before dialing; connect errors; `Sftp` for the transfer.
    pub async fn download(&self, host_id: u64, remote: &str, local: &Path) -> Result<u64> {
        validate_remote_path(remote)?;
        let lease = self.acquire(host_id).await?;
        let result = lease.fs.download(remote, local).await;
        self.release(lease, host_id).await;
        Self::finish(host_id, "download", remote, &result);
        result
    }

    /// Remove a file or an empty directory.
    ///
    /// # Errors
    ///
    /// `InvalidPath` before dialing; connect errors; `Sftp` if the path
    /// does not exist or cannot be removed.
    pub async fn delete(&self, host_id: u64, remote: &str) -> Result<()> {
        validate_remote_path(remote)?;
        let lease = self.acquire(host_id).await?;
        let result = lease.fs.delete(remote).await;
        self.release(lease, host_id).await;
        Self::finish(host_id, "delete", remote, &result);
        result
    }

    /// # Errors
    ///
    /// `InvalidPath` before dialing; connect errors; `Sftp` from the server.
    pub async fn mkdir(&self, host_id: u64, remote: &str) -> Result<()> {
        validate_remote_path(remote)?;
        let lease = self.acquire(host_id).await?;
        let result = lease.fs.mkdir(remote).await;
        self.release(lease, host_id).await;
        Self::finish(host_id, "mkdir", remote, &result);
        result
    }

    /// # Errors
    ///
    /// `InvalidPath` before dialing; connect errors; `Sftp` from the server.
    pub async fn rename(&self, host_id: u64, from: &str, to: &str) -> Result<()> {
        validate_remote_path(from)?;
        validate_remote_path(to)?;
        let lease = self.acquire(host_id).await?;
        let result = lease.fs.rename(from, to).await;
        self.release(lease, host_id).await;
        Self::finish(host_id, "rename", from, &result);
        result
    }

    /// Stage a request body to a temp file, then upload it to `remote`.
    ///
    /// The staging file is removed before this returns.
    ///
    /// # Errors
    ///
    /// `InvalidPath` before anything is staged; `Sftp` if the body cannot
    /// be read or staged; then as [`Self::upload`].
    pub async fn upload_from<S, E>(&self, host_id: u64, remote: &str, mut body: S) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        validate_remote_path(remote)?;
        let staged = self.staging.create()?;
        let staging_error = |e: &dyn std::fmt::Display| {
            BridgeError::sftp("upload", remote, format!("staging upload: {e}"))
        };

        let mut file = File::create(&staged).await.map_err(|e| staging_error(&e))?;
        let mut received = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| staging_error(&e))?;
            received += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(|e| staging_error(&e))?;
        }
        file.flush().await.map_err(|e| staging_error(&e))?;
        drop(file);
        debug!(host_id, path = %remote, bytes = received, "Upload staged");

        self.upload(host_id, &staged, remote).await
    }

    /// Download `remote` into the staging area.
    ///
    /// # Errors
    ///
    /// As [`Self::download`]; the staging file is removed on failure.
    pub async fn download_staged(&self, host_id: u64, remote: &str) -> Result<StagedDownload> {
        validate_remote_path(remote)?;
        let staged = self.staging.create()?;
        let size = self.download(host_id, remote, &staged).await?;
        Ok(StagedDownload { path: staged, size })
    }
}
