use tracing::debug;

use super::host::{AuthType, ConnectTarget, HostConnectionSpec, IpPreference, SshAuth};
use super::host::select_target_ip;
use crate::error::{BridgeError, Result};
use crate::security::CredentialCipher;

/// Turn a stored host record into a dialable target.
///
/// The auth method is decided first so an unsupported value fails before any
/// decryption happens. Only the chosen secret is decrypted.
///
/// # Errors
///
/// - `UnsupportedAuth` / `Config` when the auth type is unknown or its secret is missing
/// - `NoAddress` when neither address list holds a usable entry
/// - `Credential` when the secret cannot be decrypted
pub fn resolve_target(
    spec: &HostConnectionSpec,
    preference: IpPreference,
    cipher: &CredentialCipher,
) -> Result<ConnectTarget> {
    let auth_type = AuthType::parse(spec.host_id, &spec.auth_type)?;

    let address = select_target_ip(&spec.public_ip, &spec.private_ip, preference)
        .ok_or(BridgeError::NoAddress {
            host_id: spec.host_id,
        })?
        .to_string();

    let password = spec.encrypted_password.as_deref();
    let key = spec.encrypted_private_key.as_deref();

    let auth = match (auth_type, key, password) {
        (AuthType::Password, _, Some(sealed)) => SshAuth::Password(cipher.decrypt(sealed)?),
        (AuthType::PrivateKey, Some(sealed), _)
        | (AuthType::Both | AuthType::Unspecified, Some(sealed), _) => {
            SshAuth::PrivateKey(cipher.decrypt(sealed)?)
        }
        (AuthType::Both | AuthType::Unspecified, None, Some(sealed)) => {
            SshAuth::Password(cipher.decrypt(sealed)?)
        }
        (AuthType::Password, _, None) => {
            return Err(missing(spec.host_id, "password auth selected but no password stored"));
        }
        (AuthType::PrivateKey, None, _) => {
            return Err(missing(spec.host_id, "key auth selected but no private key stored"));
        }
        (AuthType::Both | AuthType::Unspecified, None, None) => {
            return Err(missing(spec.host_id, "no credential stored"));
        }
    };

    debug!(
        host_id = spec.host_id,
        address = %address,
        method = auth.method(),
        ?preference,
        "Resolved connection target"
    );

    Ok(ConnectTarget {
        host_id: spec.host_id,
        name: spec.name.clone(),
        address,
        port: spec.port,
        username: spec.username.clone(),
        auth,
        host_key: spec.host_key.clone(),
    })
}

fn missing(host_id: u64, reason: &str) -> BridgeError {
    BridgeError::ConfigInvalid {
        field: format!("hosts.{host_id}"),
        reason: reason.to_string(),
    }
}
