//! Agent binary deployment: SFTP first, shell stream as a fallback.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::application::ports::{FileTransfer, ProgressReporter, RemoteShell};
use crate::application::services::privilege::PrivilegeExecutor;
use crate::domain::command::RemoteCommand;
use crate::domain::error::ProvisionError;
use crate::domain::paths::ProvisionPaths;

const EXECUTABLE_MODE: i32 = 0o755;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The remote binary already had the same SHA-256; nothing was sent.
    Unchanged,
    Updated,
}

/// Upload `binary` as the agent executable.
///
/// The bytes are staged next to the target and renamed into place, so a
/// running agent is never overwritten in place. `transfer` is `None` when no
/// file-transfer sub-session could be opened; the shell fallback is then the
/// only attempt.
///
/// # Errors
///
/// Returns [`ProvisionError::Transfer`] referencing both attempts if both
/// fail, or an error if the final rename fails.
pub async fn deploy_binary<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    transfer: Option<&impl FileTransfer>,
    binary: &[u8],
    paths: &ProvisionPaths,
    reporter: &impl ProgressReporter,
) -> Result<DeployOutcome> {
    let target = paths.binary_path();
    let staged = paths.staged_binary_path();
    let digest = format!("{:x}", Sha256::digest(binary));

    if remote_digest(exec, &target).await.as_deref() == Some(digest.as_str()) {
        reporter.log("agent binary unchanged");
        return Ok(DeployOutcome::Unchanged);
    }

    let primary = match transfer {
        Some(sftp) => sftp.write_file(&staged, binary, EXECUTABLE_MODE).await,
        None => Err(anyhow::anyhow!("file transfer sub-session unavailable")),
    };
    match primary {
        Ok(()) => reporter.log(&format!("uploaded {} bytes over sftp", binary.len())),
        Err(primary) => {
            tracing::warn!(error = %primary, "sftp upload failed, trying shell stream");
            reporter.log("sftp upload failed, streaming through the command channel");
            let stream = RemoteCommand::new("cat")
                .redirect_to(&staged)
                .and(RemoteCommand::new("chmod").args(["755", staged.as_str()]));
            if let Err(fallback) = exec.run_as_user_with_input(&stream, binary).await {
                return Err(ProvisionError::Transfer {
                    primary: format!("{primary:#}"),
                    fallback: format!("{fallback:#}"),
                }
                .into());
            }
            reporter.log(&format!("uploaded {} bytes over the command channel", binary.len()));
        }
    }

    exec.run_as_user(&RemoteCommand::new("mv").args(["-f", staged.as_str(), target.as_str()]))
        .await
        .context("activating agent binary")?;
    Ok(DeployOutcome::Updated)
}

/// SHA-256 of the remote file, `None` if missing or unreadable.
pub(crate) async fn remote_digest<S: RemoteShell>(exec: &PrivilegeExecutor<'_, S>, path: &str) -> Option<String> {
    let out = exec
        .run_as_user(&RemoteCommand::new("sha256sum").arg(path))
        .await
        .ok()?;
    out.split_whitespace().next().map(str::to_string)
}
