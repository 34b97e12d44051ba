//! Ports module - Trait definitions for hexagonal architecture
//!
//! This module contains the trait definitions (ports) that define
//! the boundaries between the relay logic and external adapters.

mod connector;
mod registry;
mod remote_fs;
mod shell;

pub use connector::{SshClientTrait, SshConnector};
pub use registry::HostRegistry;
pub use remote_fs::{RemoteEntry, RemoteFs};
pub use shell::ShellChannel;

#[cfg(test)]
pub mod mock;
