//! SFTP adapter
//!
//! Implements [`RemoteFs`] on a russh-sftp session with chunked streaming
//! between the remote file and a local staging file.

use std::path::Path;

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::ports::{RemoteEntry, RemoteFs};

/// SFTP client bound to one channel
pub struct SftpClient {
    session: SftpSession,
    chunk_size: usize,
}

impl SftpClient {
    #[must_use]
    pub const fn new(session: SftpSession, chunk_size: usize) -> Self {
        Self {
            session,
            chunk_size,
        }
    }
}

/// Attach operation and path context to an SFTP error
fn sftp_error(op: &str, path: &str) -> impl FnOnce(russh_sftp::client::error::Error) -> BridgeError {
    let op = op.to_string();
    let path = path.to_string();
    move |e| BridgeError::sftp(op, path, e)
}

fn local_error(op: &str, path: &str) -> impl FnOnce(std::io::Error) -> BridgeError {
    let op = op.to_string();
    let path = path.to_string();
    move |e| BridgeError::sftp(op, path, format!("local staging file: {e}"))
}

fn removes_as_directory(attrs: &FileAttributes) -> bool {
    attrs.is_dir() && !attrs.is_symlink()
}

#[async_trait]
impl RemoteFs for SftpClient {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let entries = self
            .session
            .read_dir(path)
            .await
            .map_err(sftp_error("list", path))?;

        let mut result = Vec::new();
        for entry in entries {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let metadata = entry.metadata();
            let file_type = entry.file_type();
            result.push(RemoteEntry {
                name,
                size: metadata.size.unwrap_or(0),
                is_dir: file_type.is_dir(),
                is_symlink: file_type.is_symlink(),
                permissions: metadata.permissions.unwrap_or(0) & 0o7777,
                mtime: metadata.mtime,
            });
        }

        debug!(path = %path, count = result.len(), "Listed remote directory");
        Ok(result)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
        let local_file = File::open(local)
            .await
            .map_err(local_error("upload", remote))?;
        let mut reader = BufReader::with_capacity(self.chunk_size, local_file);

        let mut remote_file = self
            .session
            .create(remote)
            .await
            .map_err(sftp_error("upload", remote))?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(local_error("upload", remote))?;
            if n == 0 {
                break;
            }
            remote_file
                .write_all(&buffer[..n])
                .await
                .map_err(|e| BridgeError::sftp("upload", remote, format!("write error: {e}")))?;
            total += n as u64;
        }

        remote_file
            .flush()
            .await
            .map_err(|e| BridgeError::sftp("upload", remote, format!("flush error: {e}")))?;
        remote_file
            .shutdown()
            .await
            .map_err(|e| BridgeError::sftp("upload", remote, format!("close error: {e}")))?;

        debug!(remote = %remote, bytes = total, "Uploaded file");
        Ok(total)
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<u64> {
        let remote_file = self
            .session
            .open(remote)
            .await
            .map_err(sftp_error("download", remote))?;
        let mut reader = BufReader::with_capacity(self.chunk_size, remote_file);

        let local_file = File::create(local)
            .await
            .map_err(local_error("download", remote))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, local_file);

        let mut buffer = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(|e| BridgeError::sftp("download", remote, format!("read error: {e}")))?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&buffer[..n])
                .await
                .map_err(local_error("download", remote))?;
            total += n as u64;
        }

        writer
            .flush()
            .await
            .map_err(local_error("download", remote))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(local_error("download", remote))?;

        debug!(remote = %remote, bytes = total, "Downloaded file");
        Ok(total)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        // lstat: a link to a directory is unlinked, never its target
        let metadata = self
            .session
            .symlink_metadata(path)
            .await
            .map_err(sftp_error("delete", path))?;

        if removes_as_directory(&metadata) {
            self.session
                .remove_dir(path)
                .await
                .map_err(sftp_error("delete", path))
        } else {
            self.session
                .remove_file(path)
                .await
                .map_err(sftp_error("delete", path))
        }
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.session
            .create_dir(path)
            .await
            .map_err(sftp_error("mkdir", path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.session
            .rename(from, to)
            .await
            .map_err(sftp_error("rename", &format!("{from} -> {to}")))
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await.map_err(sftp_error("close", "-"))
    }
}
