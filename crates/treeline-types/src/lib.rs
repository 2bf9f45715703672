//! Shared types for the Treeline CT log cluster.
//!
//! This crate defines the types exchanged through the consistent store
//! and shared across the workspace: the node identifier ([`NodeId`]),
//! tree heads ([`SignedTreeHead`]), per-node progress
//! ([`ClusterNodeState`]), cluster-wide quorum thresholds
//! ([`ClusterConfig`]), and the watch-event envelope ([`Update`]).

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Identifier for a cluster node.
///
/// Doubles as the node's key in the consistent store, so it is a plain
/// string rather than a derived hash. Ordering is lexicographic, which
/// makes any iteration over per-node maps deterministic.
#[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tree heads
// ---------------------------------------------------------------------------

/// A signed statement binding a tree size and timestamp to a Merkle root.
///
/// Produced by the log's signing pipeline; the controller treats the
/// root hash and signature as opaque bytes and never verifies them.
/// Two STHs with equal `(tree_size, timestamp)` are interchangeable for
/// serving purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTreeHead {
    /// Number of leaves covered by this tree head.
    pub tree_size: u64,
    /// Signing time in milliseconds since the UNIX epoch. Monotonic per
    /// signing node.
    pub timestamp: u64,
    /// SHA-256 root hash of the Merkle tree at `tree_size`.
    pub root_hash: [u8; 32],
    /// Signature over the tree head, opaque to the controller.
    pub signature: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Cluster state
// ---------------------------------------------------------------------------

/// One node's progress as published to the consistent store.
///
/// Each node owns exactly one entry, keyed by `node_id`; everything
/// else a node learns about its peers arrives through the store watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNodeState {
    /// The owning node.
    pub node_id: NodeId,
    /// Hostname clients can reach this node's log frontend on.
    pub hostname: String,
    /// Port of the log frontend.
    pub log_port: u16,
    /// The newest STH this node has signed, if any.
    pub newest_sth: Option<SignedTreeHead>,
    /// Largest prefix of the log fully replicated onto this node.
    pub contiguous_tree_size: u64,
}

impl ClusterNodeState {
    /// Create an empty state for a node that has not signed or
    /// replicated anything yet.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            hostname: String::new(),
            log_port: 0,
            newest_sth: None,
            contiguous_tree_size: 0,
        }
    }
}

/// Cluster-wide quorum thresholds for advancing the serving STH.
///
/// Both conditions must hold for a tree size to be servable: at least
/// `minimum_serving_nodes` nodes, and at least `minimum_serving_fraction`
/// of all known nodes, must have signed an STH at that size or larger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Absolute lower bound on the number of nodes able to serve.
    pub minimum_serving_nodes: u64,
    /// Fractional lower bound, in `[0.0, 1.0]`, over all known nodes,
    /// including nodes that have not signed any STH yet.
    pub minimum_serving_fraction: f64,
}

// ---------------------------------------------------------------------------
// Watch events
// ---------------------------------------------------------------------------

/// A single change notification from a store watch.
///
/// When `exists` is false the resource was removed and `entry` carries
/// its last known value, so removals still identify their key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update<T> {
    /// Whether the resource exists after this update.
    pub exists: bool,
    /// The current value, or the last known value for a removal.
    pub entry: T,
}

impl<T> Update<T> {
    /// An update reporting that the resource now holds `entry`.
    pub fn set(entry: T) -> Self {
        Self {
            exists: true,
            entry,
        }
    }

    /// An update reporting that the resource was removed; `entry` is
    /// its last known value.
    pub fn removed(entry: T) -> Self {
        Self {
            exists: false,
            entry,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
