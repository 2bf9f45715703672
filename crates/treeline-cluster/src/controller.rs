//! [`ClusterStateController`] — the per-node cluster state machine.
//!
//! The controller fuses three store watches (peer states, cluster
//! config, serving STH) with the node's own signing and replication
//! progress, and drives three decisions:
//!
//! - recomputing the calculated serving STH whenever its inputs change,
//! - joining or leaving the master election,
//! - publishing the calculated serving STH while this node is master.
//!
//! All mutable state sits behind one mutex. Watch drain tasks and the
//! local mutators take the lock, update in memory, and re-derive what
//! changed; no store I/O ever happens under the lock. Store writes go
//! through two dedicated tasks: the *projector* serialises local
//! node-state publications in mutation order, and the *publisher* wakes
//! on a [`Notify`] signal to push the calculated serving STH.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use treeline_election::MasterElection;
use treeline_store::{ConfigWatch, ConsistentStore, NodeStateWatch, ServingSthWatch};
use treeline_types::{ClusterConfig, ClusterNodeState, NodeId, SignedTreeHead};

use crate::calculator::calculate_serving_sth;
use crate::error::ControllerError;

/// Mutable controller state. Invariants at every lock release:
/// `local.newest_sth` timestamps and `local.contiguous_tree_size` never
/// decrease, and `calculated_serving_sth` never shrinks its tree.
struct State {
    /// This node's progress, mirrored to the store on every change.
    local: ClusterNodeState,
    /// Every node's published state (our own echoes back through the
    /// watch), keyed by node id for deterministic iteration.
    node_states: BTreeMap<NodeId, ClusterNodeState>,
    /// Last cluster config received; `None` until the first watch event.
    config: Option<ClusterConfig>,
    /// The serving STH currently published cluster-wide.
    actual_serving_sth: Option<SignedTreeHead>,
    /// This node's candidate for the next serving STH.
    calculated_serving_sth: Option<SignedTreeHead>,
    /// The publisher has an unpublished calculation waiting.
    update_pending: bool,
    /// Shutdown has begun; the publisher must exit.
    exiting: bool,
}

/// State shared between the controller handle and its background tasks.
struct Shared {
    store: Arc<dyn ConsistentStore>,
    election: Arc<dyn MasterElection>,
    state: Mutex<State>,
    /// Wakes the publisher when `update_pending` or `exiting` is set.
    publish_wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("controller lock poisoned")
    }

    /// Recompute the calculated serving STH from the current inputs and
    /// signal the publisher if this node is master. Caller holds the lock.
    fn recalculate_serving_sth(&self, state: &mut State) {
        let Some(config) = state.config else {
            warn!("no cluster config known yet; cannot calculate a serving STH");
            return;
        };

        match calculate_serving_sth(
            &state.node_states,
            &config,
            state.calculated_serving_sth.as_ref(),
        ) {
            Some(sth) => {
                state.calculated_serving_sth = Some(sth);
                if self.election.is_master() {
                    state.update_pending = true;
                    self.publish_wake.notify_one();
                }
            }
            None => {
                warn!("no tree size satisfies the serving quorum; keeping previous serving STH");
            }
        }
    }

    /// Decide whether this node may take part in the master election.
    /// Caller holds the lock.
    fn reevaluate_election(&self, state: &State) {
        match &state.actual_serving_sth {
            None => {
                // Cluster not initialised; refuse mastership.
                warn!("cluster has no serving STH; leaving election");
                self.election.stop_election();
            }
            Some(serving) if serving.tree_size > state.local.contiguous_tree_size => {
                // Cannot sign on top of data we have not replicated.
                info!(
                    serving_tree_size = serving.tree_size,
                    contiguous_tree_size = state.local.contiguous_tree_size,
                    "local replication behind serving STH; leaving election"
                );
                self.election.stop_election();
            }
            Some(_) => self.election.start_election(),
        }
    }
}

/// Handles for every background task the controller owns.
struct Tasks {
    node_state_watch: JoinHandle<()>,
    config_watch: JoinHandle<()>,
    serving_sth_watch: JoinHandle<()>,
    publisher: JoinHandle<()>,
    projector: JoinHandle<()>,
}

/// The per-node cluster state controller.
///
/// Create with [`start`](ClusterStateController::start) (requires a
/// tokio runtime) and tear down with
/// [`shutdown`](ClusterStateController::shutdown); dropping without a
/// shutdown aborts the background tasks without flushing queued
/// publications.
pub struct ClusterStateController {
    shared: Arc<Shared>,
    /// Local-state snapshots queued for publication, in mutation order.
    projector_tx: Option<mpsc::UnboundedSender<ClusterNodeState>>,
    tasks: Option<Tasks>,
}

impl ClusterStateController {
    /// Start a controller for `node_id`: open the three store watches,
    /// then spawn the watch drain tasks, the local-state projector, and
    /// the serving-STH publisher.
    pub fn start(
        node_id: NodeId,
        store: Arc<dyn ConsistentStore>,
        election: Arc<dyn MasterElection>,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                local: ClusterNodeState::new(node_id.clone()),
                node_states: BTreeMap::new(),
                config: None,
                actual_serving_sth: None,
                calculated_serving_sth: None,
                update_pending: false,
                exiting: false,
            }),
            publish_wake: Notify::new(),
            store,
            election,
        });

        let node_states = shared.store.watch_cluster_node_states();
        let config = shared.store.watch_cluster_config();
        let serving_sth = shared.store.watch_serving_sth();
        let (projector_tx, projector_rx) = mpsc::unbounded_channel();

        let tasks = Tasks {
            node_state_watch: tokio::spawn(node_state_watch_loop(shared.clone(), node_states)),
            config_watch: tokio::spawn(config_watch_loop(shared.clone(), config)),
            serving_sth_watch: tokio::spawn(serving_sth_watch_loop(shared.clone(), serving_sth)),
            publisher: tokio::spawn(publisher_loop(shared.clone())),
            projector: tokio::spawn(projector_loop(shared.clone(), projector_rx)),
        };

        info!(%node_id, "cluster state controller started");
        Self {
            shared,
            projector_tx: Some(projector_tx),
            tasks: Some(tasks),
        }
    }

    // ------------------------------------------------------------------
    // Local progress (signer / replicator inputs)
    // ------------------------------------------------------------------

    /// Record the address clients reach this node's log frontend on.
    pub fn set_node_host_port(&self, host: impl Into<String>, port: u16) {
        let mut state = self.shared.lock();
        state.local.hostname = host.into();
        state.local.log_port = port;
        self.push_local_node_state(&mut state);
    }

    /// Record a freshly signed STH.
    ///
    /// # Panics
    ///
    /// Panics if `sth.timestamp` is older than the previously recorded
    /// one; the signing pipeline must hand over STHs in signing order.
    pub fn record_new_tree_head(&self, sth: SignedTreeHead) {
        let mut state = self.shared.lock();
        if let Some(prev) = &state.local.newest_sth {
            assert!(
                sth.timestamp >= prev.timestamp,
                "local STH timestamp regressed: {} < {}",
                sth.timestamp,
                prev.timestamp,
            );
        }
        debug!(
            tree_size = sth.tree_size,
            timestamp = sth.timestamp,
            "recorded new local tree head"
        );
        state.local.newest_sth = Some(sth);
        self.push_local_node_state(&mut state);
    }

    /// Record how much of the log this node has contiguously replicated.
    ///
    /// # Panics
    ///
    /// Panics if `size` is smaller than the previously recorded value;
    /// replication never un-happens.
    pub fn record_contiguous_tree_size(&self, size: u64) {
        let mut state = self.shared.lock();
        assert!(
            size >= state.local.contiguous_tree_size,
            "contiguous tree size regressed: {} < {}",
            size,
            state.local.contiguous_tree_size,
        );
        state.local.contiguous_tree_size = size;
        self.push_local_node_state(&mut state);
    }

    /// Re-gate the election, then queue the local state for publication.
    /// Caller holds the lock, so queued snapshots are in mutation order;
    /// the projector task performs the store writes.
    fn push_local_node_state(&self, state: &mut State) {
        // Local progress may change our eligibility for mastership
        // (e.g. replication just caught up).
        self.shared.reevaluate_election(state);

        if let Some(tx) = &self.projector_tx {
            let _ = tx.send(state.local.clone());
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// The serving STH this node has calculated, or
    /// [`ControllerError::NoCalculatedSth`] if none was ever computed.
    pub fn calculated_serving_sth(&self) -> Result<SignedTreeHead, ControllerError> {
        self.shared
            .lock()
            .calculated_serving_sth
            .clone()
            .ok_or(ControllerError::NoCalculatedSth)
    }

    /// The serving STH currently published cluster-wide, as observed
    /// through the store watch.
    pub fn actual_serving_sth(&self) -> Option<SignedTreeHead> {
        self.shared.lock().actual_serving_sth.clone()
    }

    /// Snapshot of this node's local state.
    pub fn local_node_state(&self) -> ClusterNodeState {
        self.shared.lock().local.clone()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Stop the controller: cancel the watches, wake and join the
    /// publisher, flush queued local-state publications, and await every
    /// task. After this returns, no further store or election calls are
    /// made.
    pub async fn shutdown(mut self) {
        let Some(tasks) = self.tasks.take() else {
            return;
        };

        tasks.node_state_watch.abort();
        tasks.config_watch.abort();
        tasks.serving_sth_watch.abort();

        {
            let mut state = self.shared.lock();
            state.exiting = true;
        }
        self.shared.publish_wake.notify_one();

        // Closing the channel lets queued publications drain in order
        // before the projector exits.
        drop(self.projector_tx.take());

        let _ = tasks.publisher.await;
        let _ = tasks.projector.await;
        let _ = tasks.node_state_watch.await;
        let _ = tasks.config_watch.await;
        let _ = tasks.serving_sth_watch.await;

        info!("cluster state controller stopped");
    }
}

impl Drop for ClusterStateController {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.take() {
            tasks.node_state_watch.abort();
            tasks.config_watch.abort();
            tasks.serving_sth_watch.abort();
            tasks.publisher.abort();
            tasks.projector.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Apply peer-state batches, then recompute the serving STH.
async fn node_state_watch_loop(shared: Arc<Shared>, mut watch: NodeStateWatch) {
    while let Some(batch) = watch.recv().await {
        let mut state = shared.lock();
        for update in batch {
            let node_id = update.entry.node_id.clone();
            if update.exists {
                state.node_states.insert(node_id, update.entry);
            } else {
                state
                    .node_states
                    .remove(&node_id)
                    .expect("store reported removal of an unknown node state");
            }
        }
        shared.recalculate_serving_sth(&mut state);
    }
}

/// Apply cluster-config updates, then recompute the serving STH.
async fn config_watch_loop(shared: Arc<Shared>, mut watch: ConfigWatch) {
    while let Some(update) = watch.recv().await {
        let mut state = shared.lock();
        if !update.exists {
            // Transient misconfiguration; keep using the last known
            // config, if any.
            warn!("no cluster config exists");
            continue;
        }
        info!(
            minimum_serving_nodes = update.entry.minimum_serving_nodes,
            minimum_serving_fraction = update.entry.minimum_serving_fraction,
            "received new cluster config"
        );
        state.config = Some(update.entry);
        shared.recalculate_serving_sth(&mut state);
    }
}

/// Track the published serving STH, then re-gate the election. The
/// serving STH does not feed the calculation, so no recompute here.
async fn serving_sth_watch_loop(shared: Arc<Shared>, mut watch: ServingSthWatch) {
    while let Some(update) = watch.recv().await {
        let mut state = shared.lock();
        if update.exists {
            info!(
                tree_size = update.entry.tree_size,
                timestamp = update.entry.timestamp,
                "received new serving STH"
            );
            state.actual_serving_sth = Some(update.entry);
        } else {
            warn!("cluster has no serving STH");
            state.actual_serving_sth = None;
        }
        shared.reevaluate_election(&state);
    }
}

/// Publish the calculated serving STH whenever signalled, while master.
async fn publisher_loop(shared: Arc<Shared>) {
    loop {
        let wake = shared.publish_wake.notified();

        let pending = {
            let mut state = shared.lock();
            if state.exiting {
                return;
            }
            if state.update_pending {
                state.update_pending = false;
                Some(
                    state
                        .calculated_serving_sth
                        .clone()
                        .expect("publisher signalled without a calculated serving STH"),
                )
            } else {
                None
            }
        };

        match pending {
            // Lock released: the write may block on the store without
            // stalling watch callbacks or local progress.
            Some(sth) => {
                if shared.election.is_master() {
                    if let Err(e) = shared.store.set_serving_sth(&sth).await {
                        warn!(error = %e, "failed to publish serving STH");
                    }
                }
            }
            None => wake.await,
        }
    }
}

/// Write queued local-state snapshots to the store, preserving mutation
/// order. Failures are logged and dropped; the next local change
/// publishes a fresher state anyway.
async fn projector_loop(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<ClusterNodeState>) {
    while let Some(snapshot) = rx.recv().await {
        if let Err(e) = shared.store.set_cluster_node_state(&snapshot).await {
            warn!(error = %e, "failed to publish local node state");
        }
    }
}
