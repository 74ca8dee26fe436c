//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::output::OutputContext;

/// Provision bare Linux hosts into agent-managed application nodes over SSH
#[derive(Parser)]
#[command(
    name = "hostforge",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output NDJSON progress events and a JSON result
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output (also set by a non-empty `NO_COLOR`)
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install the container runtime, proxy and agent service on a host
    Provision(commands::provision::ProvisionArgs),

    /// Stop and remove the agent service from a host
    Deprovision(commands::deprovision::DeprovisionArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            no_color,
            quiet,
            json,
            command,
        } = self;
        let ctx = OutputContext::new(no_color, quiet);
        match command {
            Command::Provision(args) => commands::provision::run(&ctx, &args, json).await,
            Command::Deprovision(args) => commands::deprovision::run(&ctx, &args, json).await,
            Command::Version => {
                commands::version::run(json);
                Ok(())
            }
        }
    }
}
