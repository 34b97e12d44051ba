use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::error::Result;

const PREFIX: &str = "web-ssh-bridge-";

/// Local staging area for transfers.
///
/// Every staged file is a [`TempPath`], so it is removed when dropped no
/// matter how the transfer ended.
#[derive(Debug, Clone)]
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    /// Stage under `dir`, or the system temp directory.
    #[must_use]
    pub fn new(dir: Option<&Path>) -> Self {
        let dir = dir.map_or_else(std::env::temp_dir, |d| {
            PathBuf::from(shellexpand::tilde(&d.to_string_lossy()).as_ref())
        });
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an empty staging file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the staging directory is missing or not writable.
    pub fn create(&self) -> Result<TempPath> {
        let file = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempfile_in(&self.dir)?;
        Ok(file.into_temp_path())
    }
}
