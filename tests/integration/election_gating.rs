//! Integration test: election participation follows replication.

use treeline_integration_tests::{SimulatedCluster, WAIT, wait_for};
use treeline_types::ClusterConfig;

fn quorum(nodes: u64, fraction: f64) -> ClusterConfig {
    ClusterConfig {
        minimum_serving_nodes: nodes,
        minimum_serving_fraction: fraction,
    }
}

/// A node whose replication lags the serving STH leaves the election
/// and rejoins once it catches up.
#[tokio::test]
async fn test_lagging_node_leaves_and_rejoins() {
    let cluster = SimulatedCluster::new(3, quorum(2, 0.5)).await;
    cluster.bootstrap_serving_sth().await;

    // The genesis STH (size 0) lets every node join.
    for i in 0..cluster.len() {
        let node = cluster.node(i);
        wait_for(WAIT, || node.election.is_participating()).await;
    }

    // Nodes 0 and 1 advance to size 10 and the master publishes it;
    // node 2 is still at size 0.
    cluster.advance_node(0, 10, 100);
    cluster.advance_node(1, 10, 110);

    let laggard = cluster.node(2);
    wait_for(WAIT, || !laggard.election.is_participating()).await;
    assert!(cluster.node(0).election.is_participating());
    assert!(cluster.node(1).election.is_participating());

    // Node 2 catches up and rejoins.
    cluster.advance_node(2, 10, 120);
    wait_for(WAIT, || laggard.election.is_participating()).await;

    cluster.shutdown().await;
}

/// When the serving STH disappears from the store, every node leaves
/// the election.
#[tokio::test]
async fn test_all_nodes_leave_without_serving_sth() {
    let cluster = SimulatedCluster::new(3, quorum(2, 0.5)).await;
    cluster.bootstrap_serving_sth().await;

    for i in 0..cluster.len() {
        let node = cluster.node(i);
        wait_for(WAIT, || node.election.is_participating()).await;
    }

    cluster.store().clear_serving_sth().unwrap();

    for i in 0..cluster.len() {
        let node = cluster.node(i);
        wait_for(WAIT, || !node.election.is_participating()).await;
    }

    cluster.shutdown().await;
}
