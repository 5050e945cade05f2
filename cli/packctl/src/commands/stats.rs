//! Cluster statistics command.

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::output::{print_single, OutputFormat};

use super::CommandContext;

/// Show node and pod totals.
#[derive(Debug, Args)]
pub struct StatsCommand {}

#[derive(Debug, Serialize, Deserialize)]
struct ClusterStats {
    nodes: NodeStats,
    pods: PodStats,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeStats {
    total_nodes: usize,
    healthy_nodes: usize,
    dead_nodes: usize,
    total_cpu: u64,
    used_cpu: u64,
    available_cpu: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PodStats {
    total_pods: usize,
    running_pods: usize,
    orphaned_pods: usize,
    total_cpu_requested: u64,
    #[serde(default)]
    pods_per_node: BTreeMap<String, usize>,
}

impl StatsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let client = ctx.client()?;

        let stats: ClusterStats = client.get("/v1/stats").await?;

        match ctx.format {
            OutputFormat::Json => print_single(&stats, ctx.format),
            OutputFormat::Table => print_summary(&stats),
        }
        Ok(())
    }
}

fn print_summary(stats: &ClusterStats) {
    let nodes = &stats.nodes;
    let pods = &stats.pods;

    println!("{}", "Nodes".bold());
    println!(
        "  {} total, {} healthy, {} dead",
        nodes.total_nodes,
        nodes.healthy_nodes.to_string().green(),
        nodes.dead_nodes.to_string().red()
    );
    println!(
        "  CPU {}/{} used, {} available ({})",
        nodes.used_cpu,
        nodes.total_cpu,
        nodes.available_cpu,
        utilisation(nodes.used_cpu, nodes.total_cpu)
    );

    println!("{}", "Pods".bold());
    println!(
        "  {} total, {} running, {} orphaned, {} CPU requested",
        pods.total_pods, pods.running_pods, pods.orphaned_pods, pods.total_cpu_requested
    );
    for (node_id, count) in &pods.pods_per_node {
        println!("  {node_id}: {count}");
    }
}

fn utilisation(used: u64, total: u64) -> String {
    if total == 0 {
        return "-".to_string();
    }
    format!("{:.0}%", used as f64 * 100.0 / total as f64)
}
