//! hostforge - Provision bare Linux hosts into agent-managed application nodes

use clap::Parser;
use hostforge_cli::cli::Cli;
use hostforge_cli::output::json::{error_code, format_error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    if let Err(e) = cli.run().await {
        match format_error(&format!("{e:#}"), error_code(&e)) {
            Ok(obj) if json => println!("{obj}"),
            _ => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}
