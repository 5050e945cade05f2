//! CLI commands.

mod nodes;
mod pods;
mod stats;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// packctl - Register nodes and place pods on a packd cluster.
#[derive(Debug, Parser)]
#[command(name = "packctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// API server base URL.
    #[arg(
        long,
        global = true,
        env = "PACKD_API_URL",
        default_value = "http://127.0.0.1:5001"
    )]
    api_url: String,

    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage cluster nodes.
    Nodes(nodes::NodesCommand),

    /// Create and list pods.
    Pods(pods::PodsCommand),

    /// Show cluster utilisation.
    Stats(stats::StatsCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let ctx = CommandContext {
            api_url: self.api_url,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Nodes(cmd) => cmd.run(ctx).await,
            Commands::Pods(cmd) => cmd.run(ctx).await,
            Commands::Stats(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("packctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub api_url: String,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.api_url)
    }
}
