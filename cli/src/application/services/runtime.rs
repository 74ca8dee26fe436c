//! Container runtime provisioning: install, daemon, compose/build plugins.
//!
//! Presence is always detected by running a probe and looking at its exit
//! status; output is never parsed to decide state.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{ProgressReporter, RemoteShell};
use crate::application::services::privilege::PrivilegeExecutor;
use crate::domain::command::RemoteCommand;

/// Upper bound for the bootstrap install and plugin installs.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(600);
/// Upper bound for starting the daemon.
pub const DAEMON_TIMEOUT: Duration = Duration::from_secs(30);

const COMPOSE_PACKAGE: &str = "docker-compose-plugin";
const BUILDX_PACKAGE: &str = "docker-buildx-plugin";

/// Ensure the container runtime is installed, its daemon is active, and the
/// compose plugin is present. A missing build plugin only degrades.
///
/// # Errors
///
/// Returns an error if the install, the daemon start, or the compose plugin
/// install fails. Timeouts surface as [`crate::domain::RemoteError::Timeout`].
pub async fn ensure_runtime<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    username: &str,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    if exec.probe(&docker(&["--version"])).await {
        reporter.log("docker already installed");
    } else {
        reporter.log("docker not found, running bootstrap installer");
        exec.run_with_timeout(
            &RemoteCommand::script("curl -fsSL https://get.docker.com | sh"),
            INSTALL_TIMEOUT,
        )
        .await
        .context("installing docker")?;
        reporter.log("docker installed");

        if !exec.is_root() {
            let usermod = RemoteCommand::new("usermod").args(["-aG", "docker", username]);
            match exec.run(&usermod).await {
                Ok(_) => reporter.log(&format!("added {username} to the docker group")),
                Err(e) => {
                    tracing::warn!(error = %e, username, "could not add user to docker group");
                    reporter.log(&format!("warning: could not add {username} to the docker group"));
                }
            }
        }
    }

    ensure_daemon(exec, reporter).await?;
    ensure_plugins(exec, reporter).await
}

async fn ensure_daemon<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    if exec
        .probe(&RemoteCommand::new("systemctl").args(["is-active", "docker"]))
        .await
    {
        return Ok(());
    }
    reporter.log("starting docker daemon");
    exec.run_with_timeout(
        &RemoteCommand::new("systemctl").args(["enable", "--now", "docker"]),
        DAEMON_TIMEOUT,
    )
    .await
    .context("starting docker daemon")?;
    Ok(())
}

async fn ensure_plugins<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    let compose = docker(&["compose", "version"]);
    let buildx = docker(&["buildx", "version"]);

    let mut missing = Vec::new();
    if !exec.probe(&compose).await {
        missing.push(COMPOSE_PACKAGE);
    }
    if !exec.probe(&buildx).await {
        missing.push(BUILDX_PACKAGE);
    }
    if missing.is_empty() {
        return Ok(());
    }

    reporter.log(&format!("installing {}", missing.join(", ")));
    let installed = match PackageManager::detect(exec).await {
        Some(pm) => exec
            .run_with_timeout(&pm.install(&missing), INSTALL_TIMEOUT)
            .await
            .map(drop),
        None => Err(anyhow::anyhow!("no supported package manager (apt-get, dnf, yum)")),
    };

    // One transaction installs both; re-probe to learn which one landed.
    if missing.contains(&COMPOSE_PACKAGE) && !exec.probe(&compose).await {
        let err = installed
            .err()
            .unwrap_or_else(|| anyhow::anyhow!("plugin still missing after install"));
        return Err(err).context("installing docker compose plugin");
    }
    if missing.contains(&BUILDX_PACKAGE) && !exec.probe(&buildx).await {
        if let Err(e) = &installed {
            tracing::warn!(error = %e, "docker buildx plugin install failed");
        }
        reporter.log("warning: docker buildx unavailable; builds will use the legacy builder");
    }
    Ok(())
}

fn docker(args: &[&str]) -> RemoteCommand {
    RemoteCommand::new("docker").args(args)
}

/// Package managers the plugin install knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageManager {
    Apt,
    Dnf,
    Yum,
}

impl PackageManager {
    async fn detect<S: RemoteShell>(exec: &PrivilegeExecutor<'_, S>) -> Option<Self> {
        for (pm, program) in [(Self::Apt, "apt-get"), (Self::Dnf, "dnf"), (Self::Yum, "yum")] {
            // `command` is a shell builtin, so this cannot go through sudo.
            let lookup = RemoteCommand::new("command").args(["-v", program]);
            if exec.run_as_user(&lookup).await.is_ok() {
                return Some(pm);
            }
        }
        None
    }

    fn install(self, packages: &[&str]) -> RemoteCommand {
        match self {
            Self::Apt => RemoteCommand::new("apt-get").args(["update", "-qq"]).and(
                RemoteCommand::new("apt-get")
                    .args(["install", "-y", "-qq"])
                    .args(packages)
                    .env("DEBIAN_FRONTEND", "noninteractive"),
            ),
            Self::Dnf => RemoteCommand::new("dnf").args(["install", "-y"]).args(packages),
            Self::Yum => RemoteCommand::new("yum").args(["install", "-y"]).args(packages),
        }
    }
}
