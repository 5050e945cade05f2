//! Node commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;
use packd_id::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{print_info, print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Node commands.
#[derive(Debug, Args)]
pub struct NodesCommand {
    #[command(subcommand)]
    command: NodesSubcommand,
}

#[derive(Debug, Subcommand)]
enum NodesSubcommand {
    /// Register a node. The caller is responsible for heartbeating it.
    Add(CapacityArgs),

    /// Start a simulated node that heartbeats from inside the API server.
    Launch(CapacityArgs),

    /// List all nodes, dead ones included.
    List,

    /// Get node details.
    Get(NodeArgs),

    /// Send one heartbeat on behalf of a node.
    Heartbeat(NodeArgs),

    /// Stop a simulated node's heartbeats.
    Terminate(NodeArgs),
}

#[derive(Debug, Args)]
struct CapacityArgs {
    /// CPU cores the node offers.
    #[arg(long)]
    cpu: i64,
}

#[derive(Debug, Args)]
struct NodeArgs {
    /// Node ID.
    node: String,
}

impl NodesCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            NodesSubcommand::Add(args) => add_node(ctx, args).await,
            NodesSubcommand::Launch(args) => launch_node(ctx, args).await,
            NodesSubcommand::List => list_nodes(ctx).await,
            NodesSubcommand::Get(args) => get_node(ctx, args).await,
            NodesSubcommand::Heartbeat(args) => heartbeat(ctx, args).await,
            NodesSubcommand::Terminate(args) => terminate(ctx, args).await,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegisterNodeResponse {
    node_id: NodeId,
    cpu_cores: u32,
    heartbeat_interval_secs: u64,
}

/// Node response from API.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeResponse {
    node_id: NodeId,
    total_cpu: u32,
    used_cpu: u32,
    available_cpu: u32,
    status: String,
    #[serde(default)]
    pod_ids: Vec<String>,
    registered_at: DateTime<Utc>,
    last_heartbeat_at: DateTime<Utc>,
}

/// One table line per node.
#[derive(Debug, Serialize, Tabled)]
struct NodeRow {
    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "Status")]
    status: String,

    #[tabled(rename = "CPU")]
    cpu: String,

    #[tabled(rename = "Available")]
    available: u32,

    #[tabled(rename = "Pods")]
    pods: usize,

    #[tabled(rename = "Last Heartbeat")]
    last_heartbeat: String,
}

impl NodeRow {
    fn new(node: &NodeResponse, now: DateTime<Utc>) -> Self {
        let status = match node.status.as_str() {
            "healthy" => node.status.green().to_string(),
            "dead" => node.status.red().to_string(),
            _ => node.status.clone(),
        };

        Self {
            id: node.node_id.to_string(),
            status,
            cpu: format!("{}/{}", node.used_cpu, node.total_cpu),
            available: node.available_cpu,
            pods: node.pod_ids.len(),
            last_heartbeat: format_age(now, node.last_heartbeat_at),
        }
    }
}

fn format_age(now: DateTime<Utc>, at: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        _ => format!("{}h ago", secs / 3600),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ListNodesResponse {
    items: Vec<NodeResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HeartbeatResponse {
    accepted: bool,
    next_heartbeat_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TerminateNodeResponse {
    node_id: NodeId,
    terminated: bool,
}

/// Register a node.
async fn add_node(ctx: CommandContext, args: CapacityArgs) -> Result<()> {
    let client = ctx.client()?;

    let response: RegisterNodeResponse = client
        .post("/v1/nodes", &json!({ "cpu_cores": args.cpu }))
        .await?;

    print_registration(&ctx, &response, "Registered");
    Ok(())
}

/// Launch a simulated node.
async fn launch_node(ctx: CommandContext, args: CapacityArgs) -> Result<()> {
    let client = ctx.client()?;

    let response: RegisterNodeResponse = client
        .post("/v1/nodes/simulated", &json!({ "cpu_cores": args.cpu }))
        .await?;

    print_registration(&ctx, &response, "Launched simulated");
    Ok(())
}

fn print_registration(ctx: &CommandContext, response: &RegisterNodeResponse, verb: &str) {
    match ctx.format {
        OutputFormat::Json => print_single(response, ctx.format),
        OutputFormat::Table => {
            print_success(&format!(
                "{verb} node {} with {} CPU",
                response.node_id, response.cpu_cores
            ));
            print_info(&format!(
                "Heartbeat every {}s to stay healthy.",
                response.heartbeat_interval_secs
            ));
        }
    }
}

/// List all nodes.
async fn list_nodes(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;

    let response: ListNodesResponse = client.get("/v1/nodes").await?;

    match ctx.format {
        OutputFormat::Table => {
            let now = Utc::now();
            let rows: Vec<NodeRow> = response
                .items
                .iter()
                .map(|node| NodeRow::new(node, now))
                .collect();
            print_output(&rows, ctx.format);
        }
        OutputFormat::Json => print_single(&response, ctx.format),
    }
    Ok(())
}

/// Get node details.
async fn get_node(ctx: CommandContext, args: NodeArgs) -> Result<()> {
    let client = ctx.client()?;

    let response: NodeResponse = client
        .get(&format!("/v1/nodes/{}", args.node))
        .await
        .map_err(|e| not_found(e, &args.node))?;

    print_single(&response, ctx.format);
    Ok(())
}

/// Heartbeat a node once.
async fn heartbeat(ctx: CommandContext, args: NodeArgs) -> Result<()> {
    let client = ctx.client()?;

    let response: HeartbeatResponse = client
        .post_empty(&format!("/v1/nodes/{}/heartbeat", args.node))
        .await
        .map_err(|e| not_found(e, &args.node))?;

    match ctx.format {
        OutputFormat::Json => print_single(&response, ctx.format),
        OutputFormat::Table => print_success(&format!(
            "Heartbeat accepted for {}; next due in {}s",
            args.node, response.next_heartbeat_secs
        )),
    }
    Ok(())
}

/// Stop a simulated node.
async fn terminate(ctx: CommandContext, args: NodeArgs) -> Result<()> {
    let client = ctx.client()?;

    let response: TerminateNodeResponse = client
        .post_empty(&format!("/v1/nodes/{}/terminate", args.node))
        .await?;

    match ctx.format {
        OutputFormat::Json => print_single(&response, ctx.format),
        OutputFormat::Table => {
            print_success(&format!("Stopped heartbeats for {}", response.node_id));
            print_info("The health monitor will declare it dead once it times out.");
        }
    }
    Ok(())
}

/// Map a plain 404 to a friendlier message; other codes pass through.
fn not_found(err: CliError, node: &str) -> CliError {
    match err {
        CliError::Api {
            status: 404,
            ref code,
            ..
        } if code == "node_not_found" => CliError::NotFound(format!("Node '{node}' not found")),
        other => other,
    }
}
