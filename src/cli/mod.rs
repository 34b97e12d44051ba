//! Command-line interface
//!
//! `serve` runs the HTTP/WebSocket relay; `encrypt` and `status` are
//! operator helpers that work on the configuration file.

mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use runner::{build_state, encrypt_secret, render_status, run_encrypt, run_serve, run_status};

/// WebSocket to SSH terminal relay with an SFTP bridge
#[derive(Parser)]
#[command(name = "web-ssh-bridge")]
#[command(about = "Browser terminal relay and SFTP bridge for managed SSH hosts")]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Start the relay (default)
    web-ssh-bridge

    # Start the relay with a custom config and listen address
    web-ssh-bridge --config /etc/web-ssh-bridge/config.yaml serve --listen 0.0.0.0:8080

    # Encrypt a password for a host record
    printf '%s' 'hunter2' | web-ssh-bridge encrypt

    # Encrypt a private key with the second key of the ring
    web-ssh-bridge encrypt --key-index 1 < ~/.ssh/id_ed25519

    # Show configured hosts
    web-ssh-bridge status")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP/WebSocket server - same as running without arguments
    Serve {
        /// Override `server.listen`
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Read a secret from stdin and print its ciphertext for a host record
    Encrypt {
        /// Index of the key in `credentials.aes_keys`
        #[arg(short, long, default_value = "0")]
        key_index: usize,
    },

    /// Show configured hosts without their secrets
    Status,
}
