//! Shared test harness for Treeline integration tests.
//!
//! Provides [`SimulatedCluster`] — N cluster state controllers running
//! against one shared in-memory store, with per-node scripted elections
//! so tests decide who the master is.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use treeline_cluster::ClusterStateController;
use treeline_election::StaticElection;
use treeline_store::{ConsistentStore, MemoryStore};
use treeline_types::{ClusterConfig, NodeId, SignedTreeHead};

/// One node of the simulated cluster.
pub struct ClusterNode {
    /// The node's controller.
    pub controller: ClusterStateController,
    /// The node's election handle; grant/revoke mastership through it.
    pub election: Arc<StaticElection>,
    /// The node's id (`"node-<i>"`).
    pub node_id: NodeId,
}

/// A simulated N-node cluster sharing one in-memory consistent store.
///
/// Node 0 starts with mastership granted; every other node participates
/// whenever the election gate lets it but never wins unless a test
/// grants it explicitly.
pub struct SimulatedCluster {
    store: Arc<MemoryStore>,
    nodes: Vec<ClusterNode>,
}

impl SimulatedCluster {
    /// Start `n` controllers against a fresh store holding `config`.
    pub async fn new(n: usize, config: ClusterConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        store
            .set_cluster_config(&config)
            .await
            .expect("publish cluster config");

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let node_id = NodeId::new(format!("node-{i}"));
            let election = Arc::new(StaticElection::new(i == 0));
            let controller =
                ClusterStateController::start(node_id.clone(), store.clone(), election.clone());
            controller.set_node_host_port(format!("{node_id}.example.com"), 6962);
            nodes.push(ClusterNode {
                controller,
                election,
                node_id,
            });
        }

        Self { store, nodes }
    }

    /// Publish a genesis serving STH (size 0) so nodes can enter the
    /// election, as an operator would when initialising a new cluster.
    pub async fn bootstrap_serving_sth(&self) {
        self.store
            .set_serving_sth(&sth(0, 1))
            .await
            .expect("publish genesis serving STH");
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Node `i`.
    pub fn node(&self, i: usize) -> &ClusterNode {
        &self.nodes[i]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the cluster has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drive node `i` forward: replication catches up to `tree_size`,
    /// then the node signs an STH at that size.
    pub fn advance_node(&self, i: usize, tree_size: u64, timestamp: u64) {
        let node = &self.nodes[i];
        node.controller.record_contiguous_tree_size(tree_size);
        node.controller.record_new_tree_head(sth(tree_size, timestamp));
    }

    /// Gracefully stop every controller.
    pub async fn shutdown(self) {
        for node in self.nodes {
            node.controller.shutdown().await;
        }
    }
}

/// Build an STH with a fixed root hash and empty signature; tests care
/// only about `(tree_size, timestamp)`.
pub fn sth(tree_size: u64, timestamp: u64) -> SignedTreeHead {
    SignedTreeHead {
        tree_size,
        timestamp,
        root_hash: [0u8; 32],
        signature: Vec::new(),
    }
}

/// Poll until `condition` holds or the timeout elapses.
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) {
    let deadline = time::Instant::now() + timeout;
    loop {
        if condition() {
            return;
        }
        if time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        time::sleep(Duration::from_millis(10)).await;
    }
}

/// Default timeout for [`wait_for`].
pub const WAIT: Duration = Duration::from_secs(10);
