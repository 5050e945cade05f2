//! Pod commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::Tabled;

use crate::output::{display_option, print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Pod commands.
#[derive(Debug, Args)]
pub struct PodsCommand {
    #[command(subcommand)]
    command: PodsSubcommand,
}

#[derive(Debug, Subcommand)]
enum PodsSubcommand {
    /// Place a pod on a healthy node.
    Create(CreatePodArgs),

    /// List all pods.
    List,
}

#[derive(Debug, Args)]
struct CreatePodArgs {
    /// CPU cores the pod requires.
    #[arg(long)]
    cpu: i64,
}

impl PodsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            PodsSubcommand::Create(args) => create_pod(ctx, args).await,
            PodsSubcommand::List => list_pods(ctx).await,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CreatePodResponse {
    pod_id: String,
    node_id: String,
    cpu_requirement: u32,
    policy: String,
}

/// Pod response from API.
#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct PodResponse {
    #[tabled(rename = "ID")]
    pod_id: String,

    #[tabled(rename = "CPU")]
    cpu_requirement: u32,

    #[tabled(rename = "Node", display = "display_option")]
    #[serde(default)]
    node_id: Option<String>,

    #[tabled(rename = "Status")]
    status: String,

    #[tabled(rename = "Orphaned From", display = "display_option")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    orphaned_from: Option<String>,

    #[tabled(rename = "Created")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListPodsResponse {
    items: Vec<PodResponse>,
}

/// Create a pod.
async fn create_pod(ctx: CommandContext, args: CreatePodArgs) -> Result<()> {
    let client = ctx.client()?;

    let response: CreatePodResponse = client
        .post("/v1/pods", &json!({ "cpu_requirement": args.cpu }))
        .await?;

    match ctx.format {
        OutputFormat::Json => print_single(&response, ctx.format),
        OutputFormat::Table => print_success(&format!(
            "Placed pod {} ({} CPU) on node {} using {}",
            response.pod_id, response.cpu_requirement, response.node_id, response.policy
        )),
    }
    Ok(())
}

/// List all pods.
async fn list_pods(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;

    let response: ListPodsResponse = client.get("/v1/pods").await?;

    match ctx.format {
        OutputFormat::Table => print_output(&response.items, ctx.format),
        OutputFormat::Json => print_single(&response, ctx.format),
    }
    Ok(())
}
