//! Application service: provision and deprovision use-cases.
//!
//! Imports only from `crate::domain` and `crate::application`. One run owns
//! one connection and runs its phases strictly in order; the first hard
//! failure ends the run. The session is closed on every exit path.

use std::future::Future;

use anyhow::{Context, Result};

use crate::application::ports::{
    CertificateAuthority, Connector, ProgressReporter, RemoteSession,
};
use crate::application::services::binary::{DeployOutcome, deploy_binary};
use crate::application::services::certs::{CertsOutcome, install_certificates};
use crate::application::services::identity::resolve_identity;
use crate::application::services::network::{NetworkOutcome, ensure_network};
use crate::application::services::paths::{login_dir, resolve_paths};
use crate::application::services::privilege::PrivilegeExecutor;
use crate::application::services::proxy::{ProxyOutcome, ensure_proxy};
use crate::application::services::runtime::ensure_runtime;
use crate::application::services::service_unit::{
    ServiceOptions, ServiceOutcome, install_service, systemctl,
};
use crate::domain::command::RemoteCommand;
use crate::domain::paths::{AGENT_DIR_NAME, ProvisionPaths, UNIT_NAME};
use crate::domain::proxy::{NETWORK_NAME, validate_acme_email};
use crate::domain::unit::validate_unit_value;
use crate::domain::{Step, StepStatus, TargetHost};

/// Inputs of one provisioning run.
#[derive(Debug, Clone, Copy)]
pub struct ProvisionRequest<'a> {
    pub host: &'a TargetHost,
    /// Agent executable bytes.
    pub agent_binary: &'a [u8],
    pub backend_addr: Option<&'a str>,
    pub agent_port: Option<u16>,
    /// Enables the reverse proxy when set.
    pub acme_email: Option<&'a str>,
}

/// What each phase did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub network: NetworkOutcome,
    /// `None` when no ACME email was configured.
    pub proxy: Option<ProxyOutcome>,
    pub paths: ProvisionPaths,
    pub certs: CertsOutcome,
    pub binary: DeployOutcome,
    pub service: ServiceOutcome,
}

/// Provision the host described by `request`.
///
/// # Errors
///
/// Returns the first fatal phase error, wrapped with the phase name.
/// A malformed ACME email, or a host id or backend address that cannot be
/// written into the service unit, is rejected before connecting.
pub async fn provision<C: Connector>(
    connector: &C,
    ca: &impl CertificateAuthority,
    reporter: &impl ProgressReporter,
    request: &ProvisionRequest<'_>,
) -> Result<ProvisionReport> {
    if let Some(email) = request.acme_email {
        validate_acme_email(email)?;
    }
    validate_unit_value("host id", &request.host.host_id)?;
    if let Some(addr) = request.backend_addr {
        validate_unit_value("backend address", addr)?;
    }

    let host = request.host;
    let session = tracked(
        reporter,
        Step::Connect,
        &format!("connecting to {}", host.socket_label()),
        connector.connect(host),
        |_| format!("connected as {}", host.username),
    )
    .await
    .context("connecting")?;

    let result = provision_session(&session, ca, reporter, request).await;
    session.close().await;
    result
}

async fn provision_session<S: RemoteSession>(
    session: &S,
    ca: &impl CertificateAuthority,
    reporter: &impl ProgressReporter,
    request: &ProvisionRequest<'_>,
) -> Result<ProvisionReport> {
    let host = request.host;
    let identity = tracked(
        reporter,
        Step::Identity,
        "resolving remote identity",
        resolve_identity(session),
        |id| format!("uid {} home {}", id.uid, id.home),
    )
    .await
    .context("resolving identity")?;

    let exec = PrivilegeExecutor::new(session, &identity.uid, host.password.as_deref());

    tracked(
        reporter,
        Step::Runtime,
        "ensuring container runtime",
        ensure_runtime(&exec, &host.username, reporter),
        |()| "container runtime ready".to_string(),
    )
    .await
    .context("installing container runtime")?;

    let network = tracked(
        reporter,
        Step::Network,
        &format!("ensuring network {NETWORK_NAME}"),
        ensure_network(&exec, NETWORK_NAME, reporter),
        |outcome| match outcome {
            NetworkOutcome::AlreadyPresent => format!("network {NETWORK_NAME} present"),
            NetworkOutcome::Created => format!("network {NETWORK_NAME} created"),
        },
    )
    .await
    .context("ensuring network")?;

    let proxy = match request.acme_email {
        Some(email) => Some(
            tracked(
                reporter,
                Step::Proxy,
                "ensuring reverse proxy",
                ensure_proxy(&exec, email, reporter),
                |outcome| match outcome {
                    ProxyOutcome::UpToDate => "reverse proxy up to date".to_string(),
                    ProxyOutcome::Installed => "reverse proxy installed".to_string(),
                },
            )
            .await
            .context("installing reverse proxy")?,
        ),
        None => {
            reporter.step(Step::Proxy, StepStatus::Ok, "skipped: no ACME email configured");
            None
        }
    };

    reporter.step(Step::FileTransfer, StepStatus::Running, "opening sftp session");
    let transfer = match session.open_file_transfer().await {
        Ok(t) => {
            reporter.step(Step::FileTransfer, StepStatus::Ok, "sftp session open");
            Some(t)
        }
        Err(e) => {
            tracing::warn!(error = %e, "sftp unavailable");
            reporter.step(
                Step::FileTransfer,
                StepStatus::Ok,
                "sftp unavailable; uploads will use the command channel",
            );
            None
        }
    };

    let paths = tracked(
        reporter,
        Step::Paths,
        "resolving install paths",
        resolve_paths(&exec, &identity, reporter),
        |p| format!("installing into {}", p.install_dir),
    )
    .await
    .context("resolving install paths")?;

    let certs = tracked(
        reporter,
        Step::Certificates,
        "installing agent certificates",
        install_certificates(&exec, ca, host, &paths, reporter),
        |outcome| match outcome {
            CertsOutcome::Unchanged => "certificates unchanged".to_string(),
            CertsOutcome::Updated => "certificates installed".to_string(),
        },
    )
    .await
    .context("installing certificates")?;

    let binary = tracked(
        reporter,
        Step::Binary,
        "deploying agent binary",
        deploy_binary(&exec, transfer.as_ref(), request.agent_binary, &paths, reporter),
        |outcome| match outcome {
            DeployOutcome::Unchanged => "agent binary unchanged".to_string(),
            DeployOutcome::Updated => "agent binary deployed".to_string(),
        },
    )
    .await
    .context("deploying agent binary")?;

    let service = tracked(
        reporter,
        Step::Service,
        "installing agent service",
        install_service(
            &exec,
            &paths,
            &host.host_id,
            &host.username,
            ServiceOptions {
                backend_addr: request.backend_addr,
                agent_port: request.agent_port,
            },
            binary == DeployOutcome::Updated || certs == CertsOutcome::Updated,
            reporter,
        ),
        |outcome| match outcome {
            ServiceOutcome::AlreadyRunning => "agent already running".to_string(),
            ServiceOutcome::Restarted => "agent started".to_string(),
        },
    )
    .await
    .context("installing agent service")?;

    tracing::info!(host = %host.socket_label(), "provisioning complete");
    Ok(ProvisionReport {
        network,
        proxy,
        paths,
        certs,
        binary,
        service,
    })
}

/// Remove the agent service and installation from `host`.
///
/// Every removal step is best-effort: failures are reported but the
/// remaining steps still run, so a partially removed host converges.
///
/// # Errors
///
/// Returns an error only if the connection or identity resolution fails.
pub async fn deprovision<C: Connector>(
    connector: &C,
    reporter: &impl ProgressReporter,
    host: &TargetHost,
) -> Result<()> {
    let session = tracked(
        reporter,
        Step::Connect,
        &format!("connecting to {}", host.socket_label()),
        connector.connect(host),
        |_| format!("connected as {}", host.username),
    )
    .await
    .context("connecting")?;

    let result = deprovision_session(&session, reporter).await;
    session.close().await;
    result
}

async fn deprovision_session<S: RemoteSession>(
    session: &S,
    reporter: &impl ProgressReporter,
) -> Result<()> {
    let identity = tracked(
        reporter,
        Step::Identity,
        "resolving remote identity",
        resolve_identity(session),
        |id| format!("uid {} home {}", id.uid, id.home),
    )
    .await
    .context("resolving identity")?;
    let exec = PrivilegeExecutor::new(session, &identity.uid, None);

    // Either base may have been used by an earlier run.
    let mut candidates = Vec::new();
    if identity.home.starts_with('/') {
        candidates.push(ProvisionPaths::from_base(&identity.home, &identity.uid));
    }
    let fallback = ProvisionPaths::from_base(&login_dir(&exec).await, &identity.uid);
    if candidates.iter().all(|c| c.install_dir != fallback.install_dir) {
        candidates.push(fallback);
    }
    let primary = &candidates[0];

    best_effort(
        reporter,
        Step::StopService,
        &format!("stopping {UNIT_NAME}"),
        exec.run_as_user(&systemctl(primary, &["disable", "--now", UNIT_NAME])),
    )
    .await;

    let remove_units = RemoteCommand::new("rm")
        .arg("-f")
        .args(candidates.iter().map(ProvisionPaths::unit_path))
        .and(systemctl(primary, &["daemon-reload"]));
    best_effort(reporter, Step::RemoveUnit, "removing unit file", exec.run_as_user(&remove_units)).await;

    let remove_dirs = RemoteCommand::new("rm")
        .arg("-rf")
        .args(candidates.iter().map(|p| p.install_dir.as_str()));
    best_effort(
        reporter,
        Step::RemoveInstall,
        &format!("removing {AGENT_DIR_NAME}"),
        exec.run_as_user(&remove_dirs),
    )
    .await;

    tracing::info!("deprovisioning complete");
    Ok(())
}

/// Run one phase, emitting `running` then `ok`/`failed`.
async fn tracked<T>(
    reporter: &impl ProgressReporter,
    step: Step,
    running: &str,
    phase: impl Future<Output = Result<T>>,
    done: impl FnOnce(&T) -> String,
) -> Result<T> {
    reporter.step(step, StepStatus::Running, running);
    match phase.await {
        Ok(value) => {
            reporter.step(step, StepStatus::Ok, &done(&value));
            Ok(value)
        }
        Err(e) => {
            reporter.step(step, StepStatus::Failed, &format!("{e:#}"));
            Err(e)
        }
    }
}

/// Run one best-effort phase; failures are reported and swallowed.
async fn best_effort<T>(
    reporter: &impl ProgressReporter,
    step: Step,
    running: &str,
    phase: impl Future<Output = Result<T>>,
) {
    if tracked(reporter, step, running, phase, |_| "done".to_string())
        .await
        .is_err()
    {
        tracing::warn!(step = step.id(), "best-effort step failed");
    }
}
