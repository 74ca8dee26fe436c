//! `hostforge provision`: bring a host to the provisioned state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::application::ports::ProgressReporter;
use crate::application::services::provision::{ProvisionReport, ProvisionRequest, provision};
use crate::commands::ConnectArgs;
use crate::infra::ca::CommandAuthority;
use crate::infra::ssh::SshConnector;
use crate::output::OutputContext;
use crate::output::json::JsonReporter;
use crate::output::reporter::TerminalReporter;

/// Arguments for the provision command.
#[derive(Args, Debug)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Agent executable to install on the host
    #[arg(long, env = "HOSTFORGE_AGENT_BINARY")]
    pub agent_binary: PathBuf,

    /// Program issuing agent certificates, called as `<program> <host-id> <address>`
    #[arg(long, env = "HOSTFORGE_CA_COMMAND")]
    pub ca_command: PathBuf,

    /// Control-plane address the agent connects to [default: localhost:50051]
    #[arg(long, env = "HOSTFORGE_BACKEND_ADDR")]
    pub backend_addr: Option<String>,

    /// Port the agent listens on [default: 50052]
    #[arg(long, env = "HOSTFORGE_AGENT_PORT")]
    pub agent_port: Option<u16>,

    /// ACME contact email; enables the TLS reverse proxy
    #[arg(long, env = "HOSTFORGE_ACME_EMAIL")]
    pub acme_email: Option<String>,
}

/// Run `hostforge provision`.
///
/// # Errors
///
/// Returns an error if inputs cannot be read or any fatal phase fails.
pub async fn run(ctx: &OutputContext, args: &ProvisionArgs, json: bool) -> Result<()> {
    let host = args.connect.target().await?;
    let agent_binary = tokio::fs::read(&args.agent_binary)
        .await
        .with_context(|| format!("reading agent binary {}", args.agent_binary.display()))?;

    let connector = SshConnector::new(args.connect.known_hosts()?);
    let ca = CommandAuthority::new(args.ca_command.clone());
    let request = ProvisionRequest {
        host: &host,
        agent_binary: &agent_binary,
        backend_addr: args.backend_addr.as_deref(),
        agent_port: args.agent_port,
        acme_email: args.acme_email.as_deref(),
    };

    if json {
        let reporter = JsonReporter::new(std::io::stdout());
        let report = provision(&connector, &ca, &reporter, &request).await?;
        println!("{}", result_json(&host.host_id, &report));
    } else {
        let reporter = TerminalReporter::new(ctx);
        reporter.log(&format!("provisioning {}", host.socket_label()));
        let report = provision(&connector, &ca, &reporter, &request).await?;
        drop(reporter);
        ctx.success(&format!("{} provisioned", host.host_id));
        ctx.kv("install dir", &report.paths.install_dir);
        ctx.kv("unit", &report.paths.unit_path());
    }
    Ok(())
}

fn result_json(host_id: &str, report: &ProvisionReport) -> serde_json::Value {
    serde_json::json!({
        "event": "result",
        "host_id": host_id,
        "install_dir": report.paths.install_dir,
        "network": format!("{:?}", report.network),
        "proxy": report.proxy.map(|p| format!("{p:?}")),
        "certificates": format!("{:?}", report.certs),
        "binary": format!("{:?}", report.binary),
        "service": format!("{:?}", report.service),
    })
}
