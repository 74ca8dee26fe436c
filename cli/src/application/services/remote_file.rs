//! Remote file writes for privileged (system) paths.
//!
//! The strategy depends on who is acting:
//! - root: stream into `cat > path`
//! - non-root with a secret: write a temp file as the user, then `mv` it into
//!   place with interactive elevation
//! - non-root without a secret: stream through `sudo -n tee path`
//!
//! A failed write leaves the target's content indeterminate; callers must not
//! assume the previous content survived.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};

use crate::application::ports::RemoteShell;
use crate::application::services::privilege::PrivilegeExecutor;
use crate::domain::command::{Elevation, RemoteCommand};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `contents` to the absolute remote `path`.
///
/// # Errors
///
/// Returns an error naming `path` if the write (or, for the secret strategy,
/// the final move) fails.
pub async fn write_remote_file<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    path: &str,
    contents: &[u8],
) -> Result<()> {
    anyhow::ensure!(path.starts_with('/'), "remote path must be absolute: {path}");
    tracing::debug!(path, bytes = contents.len(), elevation = ?exec.elevation(), "writing remote file");

    match exec.elevation() {
        Elevation::Root => {
            exec.run_with_input(&RemoteCommand::new("cat").redirect_to(path), contents)
                .await
                .with_context(|| format!("writing {path}"))?;
        }
        Elevation::Interactive => {
            let temp = temp_path();
            exec.run_as_user_with_input(&RemoteCommand::new("cat").redirect_to(&temp), contents)
                .await
                .with_context(|| format!("staging {path} at {temp}"))?;
            let moved = exec
                .run(&RemoteCommand::new("mv").args(["-f", temp.as_str(), path]))
                .await;
            if let Err(e) = moved {
                if let Err(cleanup) = exec
                    .run_as_user(&RemoteCommand::new("rm").args(["-f", temp.as_str()]))
                    .await
                {
                    tracing::warn!(error = %cleanup, temp, "failed to remove staged file");
                }
                return Err(e).with_context(|| format!("moving staged file into {path}"));
            }
        }
        Elevation::Passwordless => {
            let tee = RemoteCommand::new("tee").arg(path).redirect_to("/dev/null");
            exec.run_with_input(&tee, contents)
                .await
                .with_context(|| format!("writing {path}"))?;
        }
    }
    Ok(())
}

fn temp_path() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/tmp/.hostforge-{}-{nanos}-{seq}", std::process::id())
}
