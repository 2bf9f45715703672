//! Core trait for the consistent store consumed by the controller.

use tokio::sync::mpsc;
use treeline_types::{ClusterConfig, ClusterNodeState, SignedTreeHead, Update};

use crate::error::StoreError;

/// Subscription to per-node state changes, delivered in batches.
pub type NodeStateWatch = mpsc::UnboundedReceiver<Vec<Update<ClusterNodeState>>>;

/// Subscription to cluster configuration changes.
pub type ConfigWatch = mpsc::UnboundedReceiver<Update<ClusterConfig>>;

/// Subscription to serving-STH changes.
pub type ServingSthWatch = mpsc::UnboundedReceiver<Update<SignedTreeHead>>;

/// The consistent store surface consumed by the cluster state
/// controller.
///
/// All implementations must be `Send + Sync`; writes may block on
/// network I/O and so are async. Watches return an unbounded receiver:
/// the subscriber first receives the current state of the watched
/// resource (where one exists), then every subsequent change, with
/// updates for any given key delivered in order. No ordering holds
/// *across* the three watches.
#[async_trait::async_trait]
pub trait ConsistentStore: Send + Sync {
    /// Upsert one node's state, keyed by its `node_id`.
    async fn set_cluster_node_state(&self, state: &ClusterNodeState) -> Result<(), StoreError>;

    /// Conditionally publish the cluster-wide serving STH.
    ///
    /// The store refuses writes that would shrink the served tree;
    /// callers must not rely on that check for their own monotonicity.
    async fn set_serving_sth(&self, sth: &SignedTreeHead) -> Result<(), StoreError>;

    /// Replace the cluster configuration.
    async fn set_cluster_config(&self, config: &ClusterConfig) -> Result<(), StoreError>;

    /// Subscribe to per-node state changes.
    fn watch_cluster_node_states(&self) -> NodeStateWatch;

    /// Subscribe to cluster configuration changes.
    fn watch_cluster_config(&self) -> ConfigWatch;

    /// Subscribe to serving-STH changes.
    fn watch_serving_sth(&self) -> ServingSthWatch;
}
