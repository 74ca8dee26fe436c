//! Resolution of the connecting user's identity.

use anyhow::{Context, Result};

use crate::application::ports::RemoteShell;
use crate::application::services::privilege::check;
use crate::domain::command::RemoteCommand;
use crate::domain::host::RemoteIdentity;

/// Resolve the numeric `uid` and home directory of the SSH user.
///
/// # Errors
///
/// Returns an error if either query fails or `id -u` is not numeric.
pub async fn resolve_identity(shell: &impl RemoteShell) -> Result<RemoteIdentity> {
    let id = RemoteCommand::new("id").arg("-u");
    let uid = check(&id, &shell.exec(id.as_str()).await?).context("querying uid")?;
    anyhow::ensure!(
        !uid.is_empty() && uid.bytes().all(|b| b.is_ascii_digit()),
        "unexpected uid {uid:?}"
    );

    let home_query = RemoteCommand::script(r#"printf '%s\n' "$HOME""#);
    let home = check(&home_query, &shell.exec(home_query.as_str()).await?)
        .context("querying home directory")?;

    tracing::info!(uid, home, "resolved remote identity");
    Ok(RemoteIdentity { uid, home })
}
