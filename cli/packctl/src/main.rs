//! packctl - CLI for the packd cluster orchestrator
//!
//! Registers nodes, places pods and inspects the cluster over the API
//! server's HTTP interface.

use anyhow::Result;
use clap::Parser;

mod client;
mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
