//! Managed container network: check-then-create.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{ProgressReporter, RemoteShell};
use crate::application::services::privilege::PrivilegeExecutor;
use crate::domain::command::RemoteCommand;
use crate::domain::error::RemoteError;

/// Upper bound for `docker network create`.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether the network was created by this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkOutcome {
    AlreadyPresent,
    Created,
}

/// Ensure the container network `name` exists.
///
/// A create that loses a race to another process ("already exists") counts
/// as success.
///
/// # Errors
///
/// Returns an error if the create fails for any other reason or times out.
pub async fn ensure_network<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    name: &str,
    reporter: &impl ProgressReporter,
) -> Result<NetworkOutcome> {
    let inspect = RemoteCommand::new("docker").args(["network", "inspect", name]);
    if exec.probe(&inspect).await {
        reporter.log(&format!("network {name} already exists"));
        return Ok(NetworkOutcome::AlreadyPresent);
    }

    let create = RemoteCommand::new("docker").args(["network", "create", name]);
    match exec.run_with_timeout(&create, NETWORK_TIMEOUT).await {
        Ok(_) => {
            reporter.log(&format!("created network {name}"));
            Ok(NetworkOutcome::Created)
        }
        Err(e) if lost_create_race(&e) => {
            reporter.log(&format!("network {name} was created concurrently"));
            Ok(NetworkOutcome::AlreadyPresent)
        }
        Err(e) => Err(e).with_context(|| format!("creating network {name}")),
    }
}

fn lost_create_race(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RemoteError>()
        .and_then(RemoteError::stderr)
        .is_some_and(|stderr| stderr.contains("already exists"))
}
