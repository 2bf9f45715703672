//! Cluster state controller for the Treeline CT log cluster.
//!
//! Every log node runs one [`ClusterStateController`]. It publishes the
//! node's local signing and replication progress to the consistent
//! store, watches every peer's progress plus the cluster configuration
//! and the published serving STH, computes the largest STH the cluster
//! may safely serve under the configured quorum, gates this node's
//! participation in master election, and, while this node is master,
//! pushes newly calculated serving STHs back to the store.

mod calculator;
mod controller;
mod error;


pub use calculator::calculate_serving_sth;
pub use controller::ClusterStateController;
pub use error::ControllerError;
