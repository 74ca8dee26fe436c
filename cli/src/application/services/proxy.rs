//! Reverse-proxy provisioning with image-version drift detection.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{ProgressReporter, RemoteShell};
use crate::application::services::privilege::PrivilegeExecutor;
use crate::application::services::remote_file::write_remote_file;
use crate::domain::command::RemoteCommand;
use crate::domain::paths;
use crate::domain::proxy::{
    ACME_STORAGE_DIR, PROXY_CONFIG_DIR, PROXY_CONFIG_PATH, ProxySpec, build_traefik_config,
};

/// Upper bound for pulling the image and starting the container.
pub const PULL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// Running with the pinned image; nothing was touched.
    UpToDate,
    /// Installed fresh or reinstalled after drift.
    Installed,
}

/// Ensure the proxy container runs the pinned image with a freshly rendered
/// configuration for `acme_email`.
///
/// The email is validated before any remote command is issued.
///
/// # Errors
///
/// Returns [`crate::domain::ProvisionError::InvalidEmail`] for a malformed
/// contact, or an error if a non-best-effort install step fails.
pub async fn ensure_proxy<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    acme_email: &str,
    reporter: &impl ProgressReporter,
) -> Result<ProxyOutcome> {
    let config = build_traefik_config(acme_email)?;
    let spec = ProxySpec::default();

    match inspect(exec, spec.container, "{{.State.Running}}").await.as_deref() {
        Some("true") => match inspect(exec, spec.container, "{{.Config.Image}}").await {
            Some(image) if image == spec.image => {
                reporter.log(&format!("{} already running {}", spec.container, spec.image));
                return Ok(ProxyOutcome::UpToDate);
            }
            Some(image) => reporter.log(&format!(
                "{} runs {image}, upgrading to {}",
                spec.container, spec.image
            )),
            None => reporter.log(&format!("cannot read {} image, reinstalling", spec.container)),
        },
        _ => reporter.log(&format!("{} not running, installing", spec.container)),
    }

    install(exec, &spec, &config, reporter).await?;
    Ok(ProxyOutcome::Installed)
}

/// `docker inspect -f <format>`; `None` on any probe error.
async fn inspect<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    container: &str,
    format: &str,
) -> Option<String> {
    exec.run(&RemoteCommand::new("docker").args(["inspect", "-f", format, container]))
        .await
        .ok()
}

async fn install<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    spec: &ProxySpec,
    config: &str,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    exec.run(&RemoteCommand::new("mkdir").args(["-p", PROXY_CONFIG_DIR, ACME_STORAGE_DIR]))
        .await
        .context("creating proxy directories")?;
    write_remote_file(exec, PROXY_CONFIG_PATH, config.as_bytes())
        .await
        .context("writing proxy configuration")?;

    let acme_store = paths::join(ACME_STORAGE_DIR, "acme.json");
    exec.run(
        &RemoteCommand::new("touch")
            .arg(&acme_store)
            .and(RemoteCommand::new("chmod").args(["600", acme_store.as_str()])),
    )
    .await
    .context("preparing ACME certificate store")?;

    if let Err(e) = exec
        .run(&RemoteCommand::new("docker").args(["rm", "-f", spec.container]))
        .await
    {
        tracing::debug!(error = %e, "no previous proxy container removed");
    }

    reporter.log(&format!("pulling {}", spec.image));
    if let Err(e) = exec
        .run_with_timeout(
            &RemoteCommand::new("docker").args(["pull", spec.image]),
            PULL_TIMEOUT,
        )
        .await
    {
        tracing::warn!(error = %e, image = spec.image, "image pull failed; relying on local image");
        reporter.log(&format!("warning: pull of {} failed, trying local image", spec.image));
    }

    exec.run_with_timeout(
        &RemoteCommand::new("docker").args(spec.run_args()),
        PULL_TIMEOUT,
    )
    .await
    .with_context(|| format!("starting {} container", spec.container))?;
    reporter.log(&format!("{} started with {}", spec.container, spec.image));
    Ok(())
}
