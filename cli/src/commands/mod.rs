//! Command implementations

pub mod deprovision;
pub mod provision;
pub mod version;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::domain::TargetHost;
use crate::domain::host::DEFAULT_SSH_PORT;
use crate::infra::known_hosts::KnownHostsFile;

/// How to reach and authenticate against the target host.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Hostname or IP address of the target
    #[arg(long, env = "HOSTFORGE_HOST")]
    pub host: String,

    /// SSH port
    #[arg(long, env = "HOSTFORGE_PORT", default_value_t = DEFAULT_SSH_PORT)]
    pub port: u16,

    /// SSH user
    #[arg(long, env = "HOSTFORGE_USER", default_value = "root")]
    pub user: String,

    /// Private key file used for authentication
    #[arg(long, short = 'i', env = "HOSTFORGE_IDENTITY_FILE")]
    pub identity_file: Option<PathBuf>,

    /// Login password; also used for sudo when the user is not root
    #[arg(long, env = "HOSTFORGE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Expected host key (`<type> <base64>`); overrides the known-hosts entry
    #[arg(long, env = "HOSTFORGE_HOST_KEY")]
    pub host_key: Option<String>,

    /// Identifier for this host in the known-hosts file and agent certificate
    /// [default: the host address]
    #[arg(long, env = "HOSTFORGE_HOST_ID")]
    pub host_id: Option<String>,

    /// Known-hosts file [default: ~/.hostforge/known_hosts]
    #[arg(long, env = "HOSTFORGE_KNOWN_HOSTS")]
    pub known_hosts: Option<PathBuf>,
}

impl ConnectArgs {
    /// Build the target descriptor, reading the private key if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity file cannot be read, or if neither a
    /// key nor a password was supplied.
    pub async fn target(&self) -> Result<TargetHost> {
        let host_id = self.host_id.as_deref().unwrap_or(&self.host);
        let mut target = TargetHost::new(&self.host, &self.user, host_id);
        target.port = self.port;
        target.password.clone_from(&self.password);
        target.host_key.clone_from(&self.host_key);
        if let Some(path) = &self.identity_file {
            let key = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading identity file {}", path.display()))?;
            target.private_key = Some(key);
        }
        anyhow::ensure!(
            target.private_key.is_some() || target.password.is_some(),
            "no credentials: pass --identity-file or --password"
        );
        Ok(target)
    }

    /// The host key store selected by `--known-hosts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default location cannot be determined.
    pub fn known_hosts(&self) -> Result<KnownHostsFile> {
        match &self.known_hosts {
            Some(path) => Ok(KnownHostsFile::with_path(path.clone())),
            None => KnownHostsFile::new(),
        }
    }
}
