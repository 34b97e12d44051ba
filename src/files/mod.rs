//! Remote file operations over short-lived SFTP channels

mod bridge;
mod info;
mod staging;

pub use bridge::{SftpBridge, StagedDownload, upload_target, validate_remote_path};
pub use info::{FileInfo, join_remote, permission_string, sort_listing};
pub use staging::Staging;
