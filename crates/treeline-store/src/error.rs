//! Error types for the store crate.

use treeline_types::NodeId;

/// Errors produced by a [`ConsistentStore`](crate::ConsistentStore)
/// implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// Conditional serving-STH write refused: the stored STH already
    /// covers a larger tree.
    #[error("serving STH precondition failed: store has tree size {current}, write of {proposed} refused")]
    PreconditionFailed {
        /// Tree size currently held by the store.
        current: u64,
        /// Tree size of the refused write.
        proposed: u64,
    },

    /// No state is stored for the given node.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
}
