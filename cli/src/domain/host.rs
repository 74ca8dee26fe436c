//! Target host descriptor and the identity resolved on it.

use std::fmt;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Everything needed to reach and authenticate against one target host.
///
/// Immutable for the duration of a provisioning run.
#[derive(Clone, PartialEq, Eq)]
pub struct TargetHost {
    /// Hostname or IP address.
    pub address: String,
    pub port: u16,
    pub username: String,
    /// PEM-encoded private key.
    pub private_key: Option<String>,
    /// Login password; doubles as the `sudo` secret.
    pub password: Option<String>,
    /// Previously pinned host public key (`<type> <base64>`).
    pub host_key: Option<String>,
    /// Opaque identifier used to persist a newly observed host key and to
    /// key the agent certificate.
    pub host_id: String,
}

impl TargetHost {
    /// A descriptor with the default port and no credentials.
    #[must_use]
    pub fn new(address: &str, username: &str, host_id: &str) -> Self {
        Self {
            address: address.to_string(),
            port: DEFAULT_SSH_PORT,
            username: username.to_string(),
            private_key: None,
            password: None,
            host_key: None,
            host_id: host_id.to_string(),
        }
    }

    /// `address:port`, bracketing IPv6 literals.
    #[must_use]
    pub fn socket_label(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

// Credentials must never end up in logs.
impl fmt::Debug for TargetHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetHost")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("host_key", &self.host_key)
            .field("host_id", &self.host_id)
            .finish()
    }
}

/// Identity of the SSH user on the remote host, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentity {
    /// Numeric user id as printed by `id -u`.
    pub uid: String,
    /// Home directory as reported by the login shell.
    pub home: String,
}

impl RemoteIdentity {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.uid == crate::domain::command::ROOT_UID
    }
}
