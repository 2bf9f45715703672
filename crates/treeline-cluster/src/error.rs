//! Error types for the cluster crate.

/// Errors returned by the cluster state controller.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// No serving STH has been calculated yet; the cluster may still be
    /// converging or quorum has never been met.
    #[error("no serving STH has been calculated yet")]
    NoCalculatedSth,
}
