//! Pod placement decisions

use clusterlet_core::{Node, NodeId};

/// Strategy for choosing the node a pod runs on
pub trait PlacementStrategy: Send + Sync {
    /// Pick a node for a pod needing `cpu_required` cores.
    ///
    /// `nodes` is in registration order. `exclude` names a node that must not
    /// be chosen (the one being drained). Must not mutate anything.
    fn select(&self, nodes: &[Node], cpu_required: u32, exclude: Option<&str>) -> Option<NodeId>;

    /// Get the strategy name
    fn name(&self) -> &'static str;
}

/// Best-fit: the healthy node left with the least spare CPU after placement.
///
/// Ties go to the earliest registered node.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestFit;

impl PlacementStrategy for BestFit {
    fn select(&self, nodes: &[Node], cpu_required: u32, exclude: Option<&str>) -> Option<NodeId> {
        let mut best: Option<(&Node, u32)> = None;

        for node in nodes {
            if !node.is_healthy() || exclude == Some(node.id.as_str()) {
                continue;
            }
            let Some(remainder) = node.available_cpu.checked_sub(cpu_required) else {
                continue;
            };
            // Strictly smaller only, so ties keep the earlier node
            if best.map_or(true, |(_, best_remainder)| remainder < best_remainder) {
                best = Some((node, remainder));
            }
        }

        best.map(|(node, _)| node.id.clone())
    }

    fn name(&self) -> &'static str {
        "best-fit"
    }
}
