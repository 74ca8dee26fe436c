//! Certificate authority backed by an operator-supplied issuer program.
//!
//! The program is invoked as `<program> <host_id> <address>` and must print a
//! JSON object `{"ca": "...", "cert": "...", "key": "..."}` with PEM strings.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::application::ports::CertificateAuthority;
use crate::domain::certs::CertificateBundle;
use crate::infra::command_runner::TokioCommandRunner;

/// Upper bound for one issuance.
pub const ISSUE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct IssuedBundle {
    ca: String,
    cert: String,
    key: String,
}

impl From<IssuedBundle> for CertificateBundle {
    fn from(b: IssuedBundle) -> Self {
        Self {
            ca_pem: b.ca.into_bytes(),
            cert_pem: b.cert.into_bytes(),
            key_pem: b.key.into_bytes(),
        }
    }
}

pub struct CommandAuthority {
    program: PathBuf,
    runner: TokioCommandRunner,
}

impl CommandAuthority {
    #[must_use]
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            runner: TokioCommandRunner::new(ISSUE_TIMEOUT),
        }
    }
}

impl CertificateAuthority for CommandAuthority {
    async fn issue_agent_certificate(&self, host_id: &str, address: &str) -> Result<CertificateBundle> {
        let program = self.program.to_string_lossy();
        tracing::debug!(%program, host_id, address, "requesting agent certificate");
        let output = self.runner.run(&program, &[host_id, address]).await?;
        if !output.status.success() {
            anyhow::bail!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        parse_bundle(&output.stdout).with_context(|| format!("parsing output of {program}"))
    }
}

fn parse_bundle(stdout: &[u8]) -> Result<CertificateBundle> {
    let issued: IssuedBundle = serde_json::from_slice(stdout)?;
    Ok(issued.into())
}
