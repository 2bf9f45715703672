//! Serving-STH calculation: the quorum sweep over peer tree sizes.

use std::collections::BTreeMap;

use tracing::{debug, info};
use treeline_types::{ClusterConfig, ClusterNodeState, NodeId, SignedTreeHead};

/// Nodes able to serve at exactly one tree size.
struct SizeBucket {
    /// How many nodes have their newest STH at this size.
    nodes: u64,
    /// Freshest STH seen at this size. On equal timestamps the STH from
    /// the lowest node id wins, keeping the choice deterministic.
    best: SignedTreeHead,
}

/// Compute the largest STH the cluster can safely serve.
///
/// Sweeps tree sizes in descending order, accumulating how many nodes
/// hold an STH at the current size or larger (a node at size `s` can
/// serve every size `≤ s`). The first size where both quorum thresholds
/// hold wins. The sweep stops below the size of `current`, so the
/// returned STH never covers a smaller tree than a previously calculated
/// one, even after the cluster shrinks or the config tightens.
///
/// Nodes that have not signed any STH contribute nothing to any size but
/// still count towards the fraction denominator. Returns `None` when no
/// size qualifies (including the empty-cluster case), leaving the
/// previous calculation in force.
pub fn calculate_serving_sth(
    peers: &BTreeMap<NodeId, ClusterNodeState>,
    config: &ClusterConfig,
    current: Option<&SignedTreeHead>,
) -> Option<SignedTreeHead> {
    debug!(nodes = peers.len(), "calculating serving STH");

    let mut by_size: BTreeMap<u64, SizeBucket> = BTreeMap::new();
    for state in peers.values() {
        let Some(sth) = &state.newest_sth else {
            continue;
        };
        by_size
            .entry(sth.tree_size)
            .and_modify(|bucket| {
                bucket.nodes += 1;
                if sth.timestamp > bucket.best.timestamp {
                    bucket.best = sth.clone();
                }
            })
            .or_insert_with(|| SizeBucket {
                nodes: 1,
                best: sth.clone(),
            });
    }

    let floor = current.map_or(0, |sth| sth.tree_size);
    let mut nodes_seen = 0u64;

    for (&size, bucket) in by_size.iter().rev() {
        if size < floor {
            break;
        }
        nodes_seen += bucket.nodes;
        let fraction = nodes_seen as f64 / peers.len() as f64;
        if nodes_seen >= config.minimum_serving_nodes
            && fraction >= config.minimum_serving_fraction
        {
            info!(
                tree_size = size,
                nodes = nodes_seen,
                coverage = %format!("{:.0}%", fraction * 100.0),
                "serving quorum met"
            );
            return Some(bucket.best.clone());
        }
    }

    None
}
