//! Integration test: peer loss and master handover.

use treeline_integration_tests::{SimulatedCluster, WAIT, sth, wait_for};
use treeline_types::{ClusterConfig, NodeId};

fn quorum(nodes: u64, fraction: f64) -> ClusterConfig {
    ClusterConfig {
        minimum_serving_nodes: nodes,
        minimum_serving_fraction: fraction,
    }
}

/// Losing a node neither regresses the serving STH nor blocks further
/// progress once the survivors sign larger trees.
#[tokio::test]
async fn test_serving_sth_survives_peer_loss() {
    let cluster = SimulatedCluster::new(3, quorum(2, 0.5)).await;
    cluster.bootstrap_serving_sth().await;

    for i in 0..cluster.len() {
        cluster.advance_node(i, 10, 100);
    }
    let store = cluster.store().clone();
    wait_for(WAIT, || {
        store.serving_sth().is_some_and(|s| s.tree_size == 10)
    })
    .await;

    // Node 2's store entry expires, as it would when the node dies.
    store
        .remove_cluster_node_state(&NodeId::from("node-2"))
        .unwrap();

    // The survivors keep signing; the serving STH follows them.
    cluster.advance_node(0, 20, 200);
    cluster.advance_node(1, 20, 210);
    wait_for(WAIT, || {
        store.serving_sth().is_some_and(|s| s.tree_size == 20)
    })
    .await;

    cluster.shutdown().await;
}

/// Mastership moves from node 0 to node 1; publication follows it.
#[tokio::test]
async fn test_master_handover() {
    let cluster = SimulatedCluster::new(3, quorum(2, 0.5)).await;
    cluster.bootstrap_serving_sth().await;

    for i in 0..cluster.len() {
        cluster.advance_node(i, 10, 100);
    }
    let store = cluster.store().clone();
    wait_for(WAIT, || {
        store.serving_sth().is_some_and(|s| s.tree_size == 10)
    })
    .await;

    cluster.node(0).election.grant(false);
    cluster.node(1).election.grant(true);

    for i in 0..cluster.len() {
        cluster.advance_node(i, 20, 200);
    }
    wait_for(WAIT, || {
        store.serving_sth().is_some_and(|s| s.tree_size == 20)
    })
    .await;

    cluster.shutdown().await;
}

/// With no master anywhere, calculations happen but nothing is
/// published.
#[tokio::test]
async fn test_no_master_no_publication() {
    let cluster = SimulatedCluster::new(3, quorum(2, 0.5)).await;
    cluster.bootstrap_serving_sth().await;
    cluster.node(0).election.grant(false);

    for i in 0..cluster.len() {
        cluster.advance_node(i, 10, 100);
    }

    // Every node calculates the servable STH...
    for i in 0..cluster.len() {
        let node = cluster.node(i);
        wait_for(WAIT, || {
            node.controller
                .calculated_serving_sth()
                .is_ok_and(|s| s.tree_size == 10)
        })
        .await;
    }

    // ...but the store never sees it.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(cluster.store().serving_sth(), Some(sth(0, 1)));

    cluster.shutdown().await;
}
