//! Agent certificate installation.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::application::ports::{CertificateAuthority, ProgressReporter, RemoteShell};
use crate::application::services::binary::remote_digest;
use crate::application::services::privilege::PrivilegeExecutor;
use crate::domain::command::RemoteCommand;
use crate::domain::host::TargetHost;
use crate::domain::paths::ProvisionPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertsOutcome {
    /// The issued bundle matched the installed files byte for byte.
    Unchanged,
    /// At least one file was (re)written; the agent must restart to load it.
    Updated,
}

/// Request a fresh bundle from the CA and write `ca.pem`, `cert.pem` and
/// `key.pem` into the install directory. Every run re-issues; files whose
/// SHA-256 already matches are left alone.
///
/// # Errors
///
/// Returns an error if issuance fails, the bundle is malformed, or a file
/// cannot be written.
pub async fn install_certificates<S: RemoteShell>(
    exec: &PrivilegeExecutor<'_, S>,
    ca: &impl CertificateAuthority,
    host: &TargetHost,
    paths: &ProvisionPaths,
    reporter: &impl ProgressReporter,
) -> Result<CertsOutcome> {
    let bundle = ca
        .issue_agent_certificate(&host.host_id, &host.address)
        .await
        .with_context(|| format!("requesting agent certificate for {}", host.host_id))?;
    bundle.validate()?;
    reporter.log(&format!("issued agent certificate for {}", host.host_id));

    let mut outcome = CertsOutcome::Unchanged;
    for (path, pem, mode) in [
        (paths.ca_path(), &bundle.ca_pem, "644"),
        (paths.cert_path(), &bundle.cert_pem, "644"),
        (paths.key_path(), &bundle.key_pem, "600"),
    ] {
        let digest = format!("{:x}", Sha256::digest(pem));
        if remote_digest(exec, &path).await.as_deref() == Some(digest.as_str()) {
            continue;
        }
        // Permissions are set before any content lands, so the key is never
        // world-readable.
        let write = RemoteCommand::new("touch")
            .arg(&path)
            .and(RemoteCommand::new("chmod").args([mode, path.as_str()]))
            .and(RemoteCommand::new("cat").redirect_to(&path));
        exec.run_as_user_with_input(&write, pem)
            .await
            .with_context(|| format!("writing {path}"))?;
        outcome = CertsOutcome::Updated;
    }
    if outcome == CertsOutcome::Unchanged {
        reporter.log("installed certificates already current");
    }
    Ok(outcome)
}
