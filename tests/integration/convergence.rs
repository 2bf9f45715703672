//! Integration test: cluster convergence on a serving STH.
//!
//! Verifies that N controllers sharing one store agree on the
//! calculated serving STH and that the master publishes it.

use treeline_integration_tests::{SimulatedCluster, WAIT, sth, wait_for};
use treeline_types::ClusterConfig;

fn quorum(nodes: u64, fraction: f64) -> ClusterConfig {
    ClusterConfig {
        minimum_serving_nodes: nodes,
        minimum_serving_fraction: fraction,
    }
}

/// Three nodes sign at the same size; the master publishes the freshest
/// STH at that size and every node observes it.
#[tokio::test]
async fn test_cluster_converges_on_serving_sth() {
    let cluster = SimulatedCluster::new(3, quorum(2, 0.5)).await;
    cluster.bootstrap_serving_sth().await;

    for i in 0..cluster.len() {
        cluster.advance_node(i, 10, 100 + i as u64 * 10);
    }

    // The freshest STH at size 10 came from node 2.
    let store = cluster.store().clone();
    wait_for(WAIT, || store.serving_sth() == Some(sth(10, 120))).await;

    for i in 0..cluster.len() {
        let node = cluster.node(i);
        wait_for(WAIT, || {
            node.controller.calculated_serving_sth().ok() == Some(sth(10, 120))
        })
        .await;
        wait_for(WAIT, || {
            node.controller.actual_serving_sth() == Some(sth(10, 120))
        })
        .await;
    }

    cluster.shutdown().await;
}

/// The serving STH keeps advancing as the cluster signs larger trees.
#[tokio::test]
async fn test_serving_sth_advances_with_progress() {
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

    for i in 0..cluster.len() {
        cluster.advance_node(i, 20, 200);
    }
    wait_for(WAIT, || {
        store.serving_sth().is_some_and(|s| s.tree_size == 20)
    })
    .await;

    cluster.shutdown().await;
}

/// With quorum requiring every node, a cluster where one node never
/// signs serves nothing beyond the genesis STH.
#[tokio::test]
async fn test_no_quorum_means_no_advance() {
    let cluster = SimulatedCluster::new(3, quorum(3, 1.0)).await;
    cluster.bootstrap_serving_sth().await;

    cluster.advance_node(0, 10, 100);
    cluster.advance_node(1, 10, 110);
    // Node 2 signs nothing.

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(
        cluster.store().serving_sth(),
        Some(sth(0, 1)),
        "serving STH must not advance without full quorum"
    );

    // Node 2 catches up and quorum completes.
    cluster.advance_node(2, 10, 120);
    let store = cluster.store().clone();
    wait_for(WAIT, || {
        store.serving_sth().is_some_and(|s| s.tree_size == 10)
    })
    .await;

    cluster.shutdown().await;
}
