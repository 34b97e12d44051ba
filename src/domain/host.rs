//! Host connection records and the decisions taken on them before dialing:
//! which address to use and which credential to present.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::{HostKeyVerification, HostRecord};
use crate::error::{BridgeError, Result};

/// Connection record handed over by the host registry.
///
/// Secrets are still encrypted here; see [`super::resolve_target`].
#[derive(Debug, Clone)]
pub struct HostConnectionSpec {
    pub host_id: u64,
    pub name: String,
    pub public_ip: Vec<String>,
    pub private_ip: Vec<String>,
    pub port: u16,
    pub username: String,
    pub auth_type: String,
    pub encrypted_password: Option<String>,
    pub encrypted_private_key: Option<String>,
    pub host_key: HostKeyPolicy,
}

impl HostConnectionSpec {
    #[must_use]
    pub fn from_record(host_id: u64, record: &HostRecord) -> Self {
        Self {
            host_id,
            name: record.name.clone(),
            public_ip: record.public_ip.clone(),
            private_ip: record.private_ip.clone(),
            port: record.port,
            username: record.username.clone(),
            auth_type: record.auth_type.clone(),
            encrypted_password: non_empty(record.password.as_deref()),
            encrypted_private_key: non_empty(record.private_key.as_deref()),
            host_key: HostKeyPolicy::from_record(record),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// How the server's host key is checked when dialing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Trust on first use against `known_hosts`
    AcceptNew,
    /// Only hosts already present in `known_hosts`
    Strict,
    /// Exactly this `SHA256:` fingerprint
    Pinned(String),
    /// Anything goes (development only)
    Off,
}

impl HostKeyPolicy {
    fn from_record(record: &HostRecord) -> Self {
        match record.host_key_verification {
            HostKeyVerification::AcceptNew => Self::AcceptNew,
            HostKeyVerification::Strict => Self::Strict,
            HostKeyVerification::Pinned => {
                Self::Pinned(record.host_key_fingerprint.clone().unwrap_or_default())
            }
            HostKeyVerification::Off => Self::Off,
        }
    }
}

/// Which address list to prefer when a host has both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IpPreference {
    #[default]
    Auto,
    Public,
    Private,
}

impl FromStr for IpPreference {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(BridgeError::Config(format!(
                "unknown ip preference '{other}' (expected auto, public or private)"
            ))),
        }
    }
}

/// Pick the address to dial.
///
/// Blank entries are skipped. `Auto` tries public addresses first; an
/// explicit preference falls back to the other list when its own is empty.
#[must_use]
pub fn select_target_ip<'a>(
    public: &'a [String],
    private: &'a [String],
    preference: IpPreference,
) -> Option<&'a str> {
    let first = |list: &'a [String]| {
        list.iter()
            .map(|ip| ip.trim())
            .find(|ip| !ip.is_empty())
    };
    match preference {
        IpPreference::Auto | IpPreference::Public => first(public).or_else(|| first(private)),
        IpPreference::Private => first(private).or_else(|| first(public)),
    }
}

/// The `auth_type` column of a host record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Password,
    PrivateKey,
    /// Key when one is stored, password otherwise
    Both,
    /// Same rule as `Both`
    Unspecified,
}

impl AuthType {
    /// Parse the stored value; anything unknown is a configuration error.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAuth` for unrecognized values.
    pub fn parse(host_id: u64, value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(Self::Unspecified),
            "password" => Ok(Self::Password),
            "privatekey" | "private_key" | "publickey" | "key" => Ok(Self::PrivateKey),
            "both" => Ok(Self::Both),
            other => Err(BridgeError::UnsupportedAuth {
                host_id,
                method: other.to_string(),
            }),
        }
    }
}

/// Decrypted credential, alive only for the duration of a dial.
pub enum SshAuth {
    Password(Zeroizing<String>),
    PrivateKey(Zeroizing<String>),
}

impl SshAuth {
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::PrivateKey(_) => "privatekey",
        }
    }
}

impl std::fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SshAuth::{}(<redacted>)", self.method())
    }
}

/// Everything the connector needs to dial one host.
#[derive(Debug)]
pub struct ConnectTarget {
    pub host_id: u64,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    pub host_key: HostKeyPolicy,
}

impl ConnectTarget {
    /// `address:port` label used in logs and errors
    #[must_use]
    pub fn endpoint(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

/// Connection state reported to the host registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Failed,
    Disconnected,
}
