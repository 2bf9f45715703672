//! `treelined` — the Treeline daemon.
//!
//! Binary entrypoint for running Treeline's cluster state controller.
//! The `simulate` subcommand runs an N-node cluster in one process
//! against a shared in-memory store: every node runs a real controller,
//! node 0 holds mastership, and synthetic signing/replication load
//! drives the serving STH forward.
//!
//! # Usage
//!
//! ```text
//! treelined simulate                    # 3-node cluster until Ctrl-C
//! treelined simulate -n 5 -r 20        # 5 nodes, 20 signing rounds
//! treelined simulate -c treeline.toml  # settings from a config file
//! ```

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::Rng;
use tokio::time;
use tracing::info;
use treeline_cluster::ClusterStateController;
use treeline_election::StaticElection;
use treeline_store::{ConsistentStore, MemoryStore};
use treeline_types::{ClusterConfig, NodeId, SignedTreeHead};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "treelined",
    version,
    about = "Treeline CT log cluster coordination daemon"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an N-node in-process cluster against a shared in-memory store.
    Simulate {
        /// Number of simulated nodes (overrides config).
        #[arg(short, long)]
        nodes: Option<usize>,

        /// Signing rounds to run, 0 for until Ctrl-C (overrides config).
        #[arg(short, long)]
        rounds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref())?;
    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Simulate { nodes, rounds } => {
            if let Some(n) = nodes {
                config.simulate.nodes = n;
            }
            if let Some(r) = rounds {
                config.simulate.rounds = r;
            }
            simulate(&config).await
        }
    }
}

// -----------------------------------------------------------------------
// Cluster simulation
// -----------------------------------------------------------------------

/// One simulated node: a real controller plus its election handle and
/// the synthetic replication state driving it.
struct SimNode {
    controller: ClusterStateController,
    election: Arc<StaticElection>,
    replicated: u64,
}

async fn simulate(config: &CliConfig) -> Result<()> {
    let n = config.simulate.nodes.max(1);
    let store = Arc::new(MemoryStore::new());

    store
        .set_cluster_config(&ClusterConfig {
            minimum_serving_nodes: config.cluster.minimum_serving_nodes,
            minimum_serving_fraction: config.cluster.minimum_serving_fraction,
        })
        .await?;

    let mut nodes = Vec::with_capacity(n);
    for i in 0..n {
        // Mastership is pinned to node 0; the others participate but
        // never win.
        let election = Arc::new(StaticElection::new(i == 0));
        let controller = ClusterStateController::start(
            NodeId::new(format!("node-{i}")),
            store.clone(),
            election.clone(),
        );
        controller.set_node_host_port(format!("node-{i}.{}", config.node.hostname), config.node.log_port);
        nodes.push(SimNode {
            controller,
            election,
            replicated: 0,
        });
    }

    // Bootstrap: publish an empty serving STH so nodes may join the
    // election, as an operator would when initialising a new cluster.
    store.set_serving_sth(&sign(0)).await?;

    info!(nodes = n, "simulation started; node-0 holds mastership");

    let mut tick = time::interval(Duration::from_millis(config.simulate.round_interval_ms.max(10)));
    let mut tree_size = 0u64;
    let mut round = 0u64;
    let mut rng = rand::rng();

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; shutting down");
                break;
            }
        }

        round += 1;
        tree_size += config.simulate.entries_per_round;

        for (i, node) in nodes.iter_mut().enumerate() {
            // Followers replicate with jitter; node 0 sequences the log
            // and is never behind.
            let lag = if i == 0 {
                0
            } else {
                rng.random_range(0..=config.simulate.entries_per_round)
            };
            let replicated = tree_size.saturating_sub(lag).max(node.replicated);
            if replicated > node.replicated {
                node.replicated = replicated;
                node.controller.record_contiguous_tree_size(replicated);
                node.controller.record_new_tree_head(sign(replicated));
            }
        }

        let in_election = nodes
            .iter()
            .filter(|node| node.election.is_participating())
            .count();
        info!(
            round,
            tree_size,
            serving_tree_size = store.serving_sth().map(|sth| sth.tree_size),
            in_election,
            "round complete"
        );

        if config.simulate.rounds != 0 && round >= config.simulate.rounds {
            break;
        }
    }

    for node in nodes {
        node.controller.shutdown().await;
    }

    match store.serving_sth() {
        Some(sth) => info!(
            tree_size = sth.tree_size,
            timestamp = sth.timestamp,
            "simulation finished"
        ),
        None => info!("simulation finished; no serving STH was ever published"),
    }
    Ok(())
}

/// Produce a synthetic STH: random root hash, wall-clock timestamp,
/// empty signature.
fn sign(tree_size: u64) -> SignedTreeHead {
    SignedTreeHead {
        tree_size,
        timestamp: now_millis(),
        root_hash: rand::rng().random(),
        signature: Vec::new(),
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
