//! In-memory consistent store with watch fan-out.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;
use treeline_types::{ClusterConfig, ClusterNodeState, NodeId, SignedTreeHead, Update};

use crate::error::StoreError;
use crate::traits::{ConfigWatch, ConsistentStore, NodeStateWatch, ServingSthWatch};

/// Everything behind one mutex so that a new subscription observes a
/// snapshot consistent with the update stream it will receive next.
struct StoreInner {
    /// Per-node state, keyed by node id. Values are postcard-encoded,
    /// as a real key-value backend would hold them.
    node_states: BTreeMap<NodeId, Vec<u8>>,
    /// The cluster configuration, if one has been published.
    cluster_config: Option<Vec<u8>>,
    /// The cluster-wide serving STH, if one has been published.
    serving_sth: Option<Vec<u8>>,
    node_state_subs: Vec<mpsc::UnboundedSender<Vec<Update<ClusterNodeState>>>>,
    config_subs: Vec<mpsc::UnboundedSender<Update<ClusterConfig>>>,
    serving_sth_subs: Vec<mpsc::UnboundedSender<Update<SignedTreeHead>>>,
}

/// In-memory [`ConsistentStore`] backend.
///
/// Holds all three resources behind a single mutex and fans updates out
/// to watch subscribers over unbounded channels. New subscribers are
/// first sent the current state of the watched resource, then every
/// change in order, the semantics a watch against a real replicated
/// store provides.
///
/// Also exposes mutation helpers ([`remove_cluster_node_state`],
/// [`clear_serving_sth`]) and read accessors that tests and the
/// single-process daemon use to drive and observe the cluster.
///
/// [`remove_cluster_node_state`]: MemoryStore::remove_cluster_node_state
/// [`clear_serving_sth`]: MemoryStore::clear_serving_sth
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                node_states: BTreeMap::new(),
                cluster_config: None,
                serving_sth: None,
                node_state_subs: Vec::new(),
                config_subs: Vec::new(),
                serving_sth_subs: Vec::new(),
            }),
        }
    }

    /// Remove a node's state, notifying watchers.
    ///
    /// Returns [`StoreError::UnknownNode`] if no state is held for the
    /// node; the store never emits a removal for a key it did not have.
    pub fn remove_cluster_node_state(&self, node_id: &NodeId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let bytes = inner
            .node_states
            .remove(node_id)
            .ok_or_else(|| StoreError::UnknownNode(node_id.clone()))?;
        let last_known: ClusterNodeState = postcard::from_bytes(&bytes)?;

        debug!(%node_id, "removed cluster node state");
        let batch = vec![Update::removed(last_known)];
        inner
            .node_state_subs
            .retain(|tx| tx.send(batch.clone()).is_ok());
        Ok(())
    }

    /// Clear the serving STH, notifying watchers with the last known
    /// value. No-op if none is published.
    pub fn clear_serving_sth(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let Some(bytes) = inner.serving_sth.take() else {
            return Ok(());
        };
        let last_known: SignedTreeHead = postcard::from_bytes(&bytes)?;

        debug!("cleared serving STH");
        inner
            .serving_sth_subs
            .retain(|tx| tx.send(Update::removed(last_known.clone())).is_ok());
        Ok(())
    }

    /// Clear the cluster configuration, notifying watchers with the
    /// last known value. No-op if none is published.
    pub fn clear_cluster_config(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let Some(bytes) = inner.cluster_config.take() else {
            return Ok(());
        };
        let last_known: ClusterConfig = postcard::from_bytes(&bytes)?;

        debug!("cleared cluster config");
        inner
            .config_subs
            .retain(|tx| tx.send(Update::removed(last_known)).is_ok());
        Ok(())
    }

    /// Return the currently published serving STH, if any.
    pub fn serving_sth(&self) -> Option<SignedTreeHead> {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner
            .serving_sth
            .as_deref()
            .map(|b| postcard::from_bytes(b).expect("corrupt serving STH"))
    }

    /// Return the current cluster configuration, if any.
    pub fn cluster_config(&self) -> Option<ClusterConfig> {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner
            .cluster_config
            .as_deref()
            .map(|b| postcard::from_bytes(b).expect("corrupt cluster config"))
    }

    /// Return one node's stored state, if any.
    pub fn node_state(&self, node_id: &NodeId) -> Option<ClusterNodeState> {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner
            .node_states
            .get(node_id)
            .map(|b| postcard::from_bytes(b).expect("corrupt node state"))
    }

    /// Return all stored node states, ordered by node id.
    pub fn node_states(&self) -> Vec<ClusterNodeState> {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner
            .node_states
            .values()
            .map(|b| postcard::from_bytes(b).expect("corrupt node state"))
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConsistentStore for MemoryStore {
    async fn set_cluster_node_state(&self, state: &ClusterNodeState) -> Result<(), StoreError> {
        let bytes = postcard::to_allocvec(state)?;
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.node_states.insert(state.node_id.clone(), bytes);

        debug!(
            node_id = %state.node_id,
            contiguous_tree_size = state.contiguous_tree_size,
            "stored cluster node state"
        );
        let batch = vec![Update::set(state.clone())];
        inner
            .node_state_subs
            .retain(|tx| tx.send(batch.clone()).is_ok());
        Ok(())
    }

    async fn set_serving_sth(&self, sth: &SignedTreeHead) -> Result<(), StoreError> {
        let bytes = postcard::to_allocvec(sth)?;
        let mut inner = self.inner.lock().expect("store lock poisoned");

        if let Some(current) = inner.serving_sth.as_deref() {
            let current: SignedTreeHead = postcard::from_bytes(current)?;
            if current.tree_size > sth.tree_size {
                return Err(StoreError::PreconditionFailed {
                    current: current.tree_size,
                    proposed: sth.tree_size,
                });
            }
        }
        inner.serving_sth = Some(bytes);

        debug!(tree_size = sth.tree_size, timestamp = sth.timestamp, "stored serving STH");
        inner
            .serving_sth_subs
            .retain(|tx| tx.send(Update::set(sth.clone())).is_ok());
        Ok(())
    }

    async fn set_cluster_config(&self, config: &ClusterConfig) -> Result<(), StoreError> {
        let bytes = postcard::to_allocvec(config)?;
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.cluster_config = Some(bytes);

        debug!(
            minimum_serving_nodes = config.minimum_serving_nodes,
            minimum_serving_fraction = config.minimum_serving_fraction,
            "stored cluster config"
        );
        inner
            .config_subs
            .retain(|tx| tx.send(Update::set(*config)).is_ok());
        Ok(())
    }

    fn watch_cluster_node_states(&self) -> NodeStateWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("store lock poisoned");

        let initial: Vec<Update<ClusterNodeState>> = inner
            .node_states
            .values()
            .map(|b| Update::set(postcard::from_bytes(b).expect("corrupt node state")))
            .collect();
        if !initial.is_empty() {
            let _ = tx.send(initial);
        }

        inner.node_state_subs.push(tx);
        rx
    }

    fn watch_cluster_config(&self) -> ConfigWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("store lock poisoned");

        if let Some(bytes) = inner.cluster_config.as_deref() {
            let config: ClusterConfig = postcard::from_bytes(bytes).expect("corrupt cluster config");
            let _ = tx.send(Update::set(config));
        }

        inner.config_subs.push(tx);
        rx
    }

    fn watch_serving_sth(&self) -> ServingSthWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("store lock poisoned");

        if let Some(bytes) = inner.serving_sth.as_deref() {
            let sth: SignedTreeHead = postcard::from_bytes(bytes).expect("corrupt serving STH");
            let _ = tx.send(Update::set(sth));
        }

        inner.serving_sth_subs.push(tx);
        rx
    }
}
