//! User-level service installation for the agent.

use anyhow::{Context, Result};

use crate::application::ports::{ProgressReporter, RemoteShell};
use crate::application::services::privilege::PrivilegeExecutor;
use crate::domain::command::RemoteCommand;
use crate::domain::paths::{ProvisionPaths, UNIT_NAME};
use crate::domain::unit::{DEFAULT_AGENT_PORT, DEFAULT_BACKEND_ADDR, UnitParams, render_unit};

/// Caller-supplied agent startup parameters; `None` selects the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceOptions<'a> {
    pub backend_addr: Option<&'a str>,
    pub agent_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// Unit, binary, certificates and run state were already as desired.
    AlreadyRunning,
    Restarted,
}

/// Write the unit, reload the user manager, enable the unit and restart it
/// when something changed.
///
/// A restart is skipped when the unit file is identical, neither the binary
/// nor the certificates were replaced (`artifacts_changed`), and the unit is
/// already active.
///
/// # Errors
///
/// Returns an error if the unit cannot be installed (including a failed
/// reload), or if enable or restart fail.
pub async fn install_service<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    paths: &ProvisionPaths,
    host_id: &str,
    username: &str,
    opts: ServiceOptions<'_>,
    artifacts_changed: bool,
    reporter: &impl ProgressReporter,
) -> Result<ServiceOutcome> {
    let unit = render_unit(&UnitParams {
        paths,
        backend_addr: opts.backend_addr.unwrap_or(DEFAULT_BACKEND_ADDR),
        host_id,
        agent_port: opts.agent_port.unwrap_or(DEFAULT_AGENT_PORT),
    })?;

    enable_linger(exec, username, reporter).await;

    let unit_path = paths.unit_path();
    let current = exec
        .run_as_user(&RemoteCommand::new("cat").arg(&unit_path))
        .await
        .ok();
    let unit_changed = current.as_deref() != Some(unit.trim());
    if unit_changed {
        install_unit(exec, paths, &unit)
            .await
            .with_context(|| format!("installing {UNIT_NAME}"))?;
        reporter.log(&format!("installed {unit_path}"));
    }

    exec.run_as_user(&systemctl(paths, &["enable", UNIT_NAME]))
        .await
        .with_context(|| format!("enabling {UNIT_NAME}"))?;

    let active = exec
        .run_as_user(&systemctl(paths, &["is-active", UNIT_NAME]))
        .await
        .is_ok();
    if !unit_changed && !artifacts_changed && active {
        reporter.log(&format!("{UNIT_NAME} already running"));
        return Ok(ServiceOutcome::AlreadyRunning);
    }

    exec.run_as_user(&systemctl(paths, &["restart", UNIT_NAME]))
        .await
        .with_context(|| format!("restarting {UNIT_NAME}"))?;
    reporter.log(&format!("{UNIT_NAME} restarted"));
    Ok(ServiceOutcome::Restarted)
}

async fn install_unit<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    paths: &ProvisionPaths,
    unit: &str,
) -> Result<()> {
    let write = RemoteCommand::new("mkdir")
        .args(["-p", paths.unit_dir.as_str()])
        .and(RemoteCommand::new("cat").redirect_to(&paths.unit_path()));
    exec.run_as_user_with_input(&write, unit.as_bytes()).await?;
    exec.run_as_user(&systemctl(paths, &["daemon-reload"]))
        .await
        .context("reloading user service manager")?;
    Ok(())
}

/// Keep the user manager alive without a login session so the agent starts
/// at boot. Best-effort.
async fn enable_linger<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    username: &str,
    reporter: &impl ProgressReporter,
) {
    let linger = RemoteCommand::new("loginctl").args(["enable-linger", username]);
    if let Err(e) = exec.run(&linger).await {
        tracing::warn!(error = %e, username, "could not enable lingering");
        reporter.log("warning: lingering not enabled; the agent may stop at logout");
    }
}

/// `systemctl --user` bound to the user's runtime directory.
pub(crate) fn systemctl(paths: &ProvisionPaths, args: &[&str]) -> RemoteCommand {
    RemoteCommand::new("systemctl")
        .arg("--user")
        .args(args)
        .env("XDG_RUNTIME_DIR", &paths.runtime_dir)
}
