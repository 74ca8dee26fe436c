//! Privilege-aware remote command execution.
//!
//! Every remote step goes through [`PrivilegeExecutor`], which applies the
//! minimum elevation for the acting identity and turns non-zero exits into
//! [`RemoteError::CommandFailed`] carrying the cleaned error stream.

use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::RemoteShell;
use crate::domain::command::{Elevation, RemoteCommand, strip_sudo_prompts};
use crate::domain::error::RemoteError;

/// Runs commands on one host as one identity.
pub struct PrivilegeExecutor<'a, S: RemoteShell> {
    shell: &'a S,
    elevation: Elevation,
    secret: Option<&'a str>,
}

impl<'a, S: RemoteShell> PrivilegeExecutor<'a, S> {
    /// Executor for the identity `uid`, with an optional elevation secret.
    pub fn new(shell: &'a S, uid: &str, secret: Option<&'a str>) -> Self {
        Self {
            shell,
            elevation: Elevation::for_identity(uid, secret.is_some()),
            secret,
        }
    }

    #[must_use]
    pub fn elevation(&self) -> Elevation {
        self.elevation
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.elevation == Elevation::Root
    }

    /// Run `cmd` elevated and return its trimmed stdout.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::CommandFailed`] on a non-zero exit, or the
    /// transport error if the command could not be run.
    pub async fn run(&self, cmd: &RemoteCommand) -> Result<String> {
        self.run_with_input(cmd, &[]).await
    }

    /// Run `cmd` elevated with `input` on its stdin.
    ///
    /// With interactive elevation the secret line is written first; `sudo`
    /// consumes exactly that line and the command receives the rest.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run`].
    pub async fn run_with_input(&self, cmd: &RemoteCommand, input: &[u8]) -> Result<String> {
        let line = cmd.render(self.elevation);
        tracing::debug!(command = %cmd, elevation = ?self.elevation, "remote exec");
        let output = match (self.elevation, self.secret) {
            (Elevation::Interactive, Some(secret)) => {
                let mut stdin = Vec::with_capacity(secret.len() + 1 + input.len());
                stdin.extend_from_slice(secret.as_bytes());
                stdin.push(b'\n');
                stdin.extend_from_slice(input);
                self.shell.exec_with_stdin(&line, &stdin).await?
            }
            _ if input.is_empty() => self.shell.exec(&line).await?,
            _ => self.shell.exec_with_stdin(&line, input).await?,
        };
        check(cmd, &output)
    }

    /// Race [`Self::run`] against `timeout`.
    ///
    /// On expiry the remote process is not terminated; the returned
    /// [`RemoteError::Timeout`] means the outcome is unknown.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run`], plus [`RemoteError::Timeout`].
    pub async fn run_with_timeout(&self, cmd: &RemoteCommand, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, self.run(cmd)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout {
                command: cmd.to_string(),
                secs: timeout.as_secs(),
            }
            .into()),
        }
    }

    /// Run `cmd` as the connecting user, without elevation.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run`].
    pub async fn run_as_user(&self, cmd: &RemoteCommand) -> Result<String> {
        tracing::debug!(command = %cmd, "remote exec (unprivileged)");
        let output = self.shell.exec(cmd.as_str()).await?;
        check(cmd, &output)
    }

    /// Run `cmd` as the connecting user with `input` on its stdin.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run`].
    pub async fn run_as_user_with_input(&self, cmd: &RemoteCommand, input: &[u8]) -> Result<String> {
        tracing::debug!(command = %cmd, bytes = input.len(), "remote exec (unprivileged, stdin)");
        let output = self.shell.exec_with_stdin(cmd.as_str(), input).await?;
        check(cmd, &output)
    }

    /// Detection probe: `true` only if `cmd` ran elevated and exited zero.
    /// Transport errors count as `false`.
    pub async fn probe(&self, cmd: &RemoteCommand) -> bool {
        self.run(cmd).await.is_ok()
    }
}

/// Trimmed stdout on success, [`RemoteError::CommandFailed`] otherwise.
pub(crate) fn check(cmd: &RemoteCommand, output: &Output) -> Result<String> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(RemoteError::CommandFailed {
            command: cmd.to_string(),
            code: output.status.code(),
            stderr: strip_sudo_prompts(String::from_utf8_lossy(&output.stderr).trim()),
        }
        .into())
    }
}
