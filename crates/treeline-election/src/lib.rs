//! Master election interface for the Treeline cluster.
//!
//! The cluster state controller never elects a master itself; it only
//! joins or leaves an externally-run election and asks who won. This
//! crate defines that seam ([`MasterElection`]) and two in-process
//! implementations:
//!
//! - [`SoloElection`] — a one-node cluster: the node is master whenever
//!   it participates.
//! - [`StaticElection`] — participation is tracked, mastership is
//!   granted externally. Used by tests and fixed-master simulations.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Handle to an externally-run master election.
///
/// All three calls must be non-blocking and are safe to make while the
/// caller holds its own lock; implementations must never call back into
/// the caller. `start_election` and `stop_election` are idempotent.
pub trait MasterElection: Send + Sync {
    /// Join the election. No-op if already participating.
    fn start_election(&self);

    /// Leave the election, relinquishing mastership if held. No-op if
    /// not participating.
    fn stop_election(&self);

    /// Whether this node currently holds mastership.
    fn is_master(&self) -> bool;
}

/// Election for a single-node cluster: the node is master exactly while
/// it participates.
#[derive(Debug, Default)]
pub struct SoloElection {
    participating: AtomicBool,
}

impl SoloElection {
    /// Create a new election with the node not yet participating.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the node currently participates.
    pub fn is_participating(&self) -> bool {
        self.participating.load(Ordering::SeqCst)
    }
}

impl MasterElection for SoloElection {
    fn start_election(&self) {
        if !self.participating.swap(true, Ordering::SeqCst) {
            debug!("joined election (solo: now master)");
        }
    }

    fn stop_election(&self) {
        if self.participating.swap(false, Ordering::SeqCst) {
            debug!("left election (solo: mastership dropped)");
        }
    }

    fn is_master(&self) -> bool {
        self.participating.load(Ordering::SeqCst)
    }
}

/// Election whose outcome is decided externally.
///
/// The node is master only while it participates *and* mastership has
/// been granted via [`grant`](StaticElection::grant). Tests use this to
/// script who the master is; the daemon's simulation uses it to pin
/// mastership to one node.
#[derive(Debug, Default)]
pub struct StaticElection {
    participating: AtomicBool,
    granted: AtomicBool,
}

impl StaticElection {
    /// Create a new election; `granted` decides whether this node wins
    /// whenever it participates.
    pub fn new(granted: bool) -> Self {
        Self {
            participating: AtomicBool::new(false),
            granted: AtomicBool::new(granted),
        }
    }

    /// Grant or revoke mastership.
    pub fn grant(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// Whether the node currently participates.
    pub fn is_participating(&self) -> bool {
        self.participating.load(Ordering::SeqCst)
    }
}

impl MasterElection for StaticElection {
    fn start_election(&self) {
        if !self.participating.swap(true, Ordering::SeqCst) {
            debug!("joined election");
        }
    }

    fn stop_election(&self) {
        if self.participating.swap(false, Ordering::SeqCst) {
            debug!("left election");
        }
    }

    fn is_master(&self) -> bool {
        self.participating.load(Ordering::SeqCst) && self.granted.load(Ordering::SeqCst)
    }
}
