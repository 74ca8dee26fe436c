//! Install-directory resolution with a login-directory fallback.
//!
//! The fallback base is always the SSH login directory as an absolute path
//! reported by `pwd`; `.` stands in only when the host reports none.

use anyhow::{Context, Result};

use crate::application::ports::{ProgressReporter, RemoteShell};
use crate::application::services::privilege::PrivilegeExecutor;
use crate::domain::command::RemoteCommand;
use crate::domain::host::RemoteIdentity;
use crate::domain::paths::{self, AGENT_DIR_NAME, ProvisionPaths};

/// Create the install directory under the home directory, falling back to
/// one under the login directory if that fails.
///
/// The unit directory is derived from whichever base succeeded.
///
/// # Errors
///
/// Returns an error only if the fallback directory cannot be created either.
pub async fn resolve_paths<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    identity: &RemoteIdentity,
    reporter: &impl ProgressReporter,
) -> Result<ProvisionPaths> {
    if identity.home.starts_with('/') {
        let install_dir = paths::join(&identity.home, AGENT_DIR_NAME);
        match exec.run_as_user(&create_private_dir(&install_dir)).await {
            Ok(_) => return Ok(ProvisionPaths::from_base(&identity.home, &identity.uid)),
            Err(e) => {
                tracing::warn!(error = %e, install_dir, "cannot create install dir under home");
                reporter.log(&format!(
                    "cannot create {install_dir}, falling back to the login directory"
                ));
            }
        }
    }

    let cwd = exec
        .run_as_user(&create_private_dir(AGENT_DIR_NAME).and(RemoteCommand::new("pwd")))
        .await
        .context("creating install directory")?;
    Ok(ProvisionPaths::from_base(&absolute_or_dot(cwd), &identity.uid))
}

/// The login directory as [`resolve_paths`] records it for its fallback.
pub async fn login_dir<S: RemoteShell>(exec: &PrivilegeExecutor<'_, S>) -> String {
    match exec.run_as_user(&RemoteCommand::new("pwd")).await {
        Ok(cwd) => absolute_or_dot(cwd),
        Err(e) => {
            tracing::warn!(error = %e, "cannot resolve login directory");
            ".".to_string()
        }
    }
}

fn absolute_or_dot(cwd: String) -> String {
    if cwd.starts_with('/') { cwd } else { ".".to_string() }
}

fn create_private_dir(dir: &str) -> RemoteCommand {
    RemoteCommand::new("mkdir")
        .args(["-p", dir])
        .and(RemoteCommand::new("chmod").args(["700", dir]))
}
