//! Fixed remote layout of an agent installation.

/// Directory name of the agent installation, relative to its base.
pub const AGENT_DIR_NAME: &str = ".hostforge";
/// Service-unit directory, relative to the same base as the install dir.
pub const UNIT_SUBDIR: &str = ".config/systemd/user";
/// Name of the user-level service unit.
pub const UNIT_NAME: &str = "hostforge-agent.service";
/// File name of the deployed agent executable.
pub const AGENT_BINARY: &str = "agent";
pub const CA_FILE: &str = "ca.pem";
pub const CERT_FILE: &str = "cert.pem";
pub const KEY_FILE: &str = "key.pem";

/// Remote install layout for one run. Derived once, read-only afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPaths {
    pub install_dir: String,
    pub unit_dir: String,
    pub runtime_dir: String,
}

impl ProvisionPaths {
    /// Derive the layout from the base directory that accepted the install
    /// directory (the home directory, or `.` for the fallback).
    #[must_use]
    pub fn from_base(base: &str, uid: &str) -> Self {
        Self {
            install_dir: join(base, AGENT_DIR_NAME),
            unit_dir: join(base, UNIT_SUBDIR),
            runtime_dir: format!("/run/user/{uid}"),
        }
    }

    #[must_use]
    pub fn binary_path(&self) -> String {
        join(&self.install_dir, AGENT_BINARY)
    }

    /// Upload staging path, renamed over [`Self::binary_path`] when complete.
    #[must_use]
    pub fn staged_binary_path(&self) -> String {
        format!("{}.new", self.binary_path())
    }

    #[must_use]
    pub fn ca_path(&self) -> String {
        join(&self.install_dir, CA_FILE)
    }

    #[must_use]
    pub fn cert_path(&self) -> String {
        join(&self.install_dir, CERT_FILE)
    }

    #[must_use]
    pub fn key_path(&self) -> String {
        join(&self.install_dir, KEY_FILE)
    }

    #[must_use]
    pub fn unit_path(&self) -> String {
        join(&self.unit_dir, UNIT_NAME)
    }
}

/// Join remote path segments; `.` as a base yields a relative path.
#[must_use]
pub fn join(base: &str, rel: &str) -> String {
    match base.trim_end_matches('/') {
        "." => rel.to_string(),
        "" if base.starts_with('/') => format!("/{rel}"),
        trimmed => format!("{trimmed}/{rel}"),
    }
}
