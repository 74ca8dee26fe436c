//! `hostforge deprovision`: remove the agent from a host.

use anyhow::Result;
use clap::Args;

use crate::application::services::provision::deprovision;
use crate::commands::ConnectArgs;
use crate::infra::ssh::SshConnector;
use crate::output::OutputContext;
use crate::output::json::JsonReporter;
use crate::output::reporter::TerminalReporter;

/// Arguments for the deprovision command.
#[derive(Args, Debug)]
pub struct DeprovisionArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Also drop the host's pinned key from the known-hosts file
    #[arg(long)]
    pub forget_host_key: bool,
}

/// Run `hostforge deprovision`.
///
/// The container runtime, network and reverse proxy are left in place; they
/// may be shared with other workloads.
///
/// # Errors
///
/// Returns an error if the host cannot be reached or the known-hosts file
/// cannot be updated.
pub async fn run(ctx: &OutputContext, args: &DeprovisionArgs, json: bool) -> Result<()> {
    let host = args.connect.target().await?;
    let store = args.connect.known_hosts()?;
    let connector = SshConnector::new(args.connect.known_hosts()?);

    if json {
        deprovision(&connector, &JsonReporter::new(std::io::stdout()), &host).await?;
    } else {
        deprovision(&connector, &TerminalReporter::new(ctx), &host).await?;
    }

    if args.forget_host_key {
        store.forget(&host.host_id)?;
    }

    if json {
        println!(
            "{}",
            serde_json::json!({ "event": "result", "host_id": host.host_id, "removed": true })
        );
    } else {
        ctx.success(&format!("{} deprovisioned", host.host_id));
    }
    Ok(())
}
