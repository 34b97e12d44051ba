use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// One directory entry as reported by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
    /// Permission bits (`st_mode & 0o7777`)
    pub permissions: u32,
    /// Modification time, seconds since the epoch
    pub mtime: Option<u32>,
}

/// File operations over an open SFTP channel.
///
/// Errors are `Sftp { op, path, .. }` so callers can report which operation
/// failed on which path.
#[async_trait]
pub trait RemoteFs: Send + Sync + 'static {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Stream a local file to `remote`, truncating any existing file.
    /// Returns the number of bytes written.
    async fn upload(&self, local: &Path, remote: &str) -> Result<u64>;

    /// Stream `remote` into a local file. Returns the number of bytes read.
    async fn download(&self, remote: &str, local: &Path) -> Result<u64>;

    /// Remove a file or an empty directory
    async fn delete(&self, path: &str) -> Result<()>;

    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Close the SFTP channel
    async fn close(&self) -> Result<()>;
}
