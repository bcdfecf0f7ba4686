//! Relocating pods off nodes that left the Healthy state

use clusterlet_core::{ClusterletResult, NodeId, PodId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::placement::PlacementStrategy;
use crate::registry::NodeRegistry;

/// Outcome of draining one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Pods moved, with their new node
    pub moved: Vec<(PodId, NodeId)>,
    /// Pods left pending for lack of capacity
    pub pending: Vec<PodId>,
    /// Pods whose relocation hit an internal error
    pub failed: Vec<PodId>,
}

/// Moves pods between nodes using the placement strategy.
///
/// Every method takes the registry by `&mut`, so callers run it under the
/// scheduler's registry lock and each call is one atomic step.
pub struct Rescheduler {
    strategy: Arc<dyn PlacementStrategy>,
}

impl Rescheduler {
    pub fn new(strategy: Arc<dyn PlacementStrategy>) -> Self {
        Self { strategy }
    }

    /// Relocate every pod on `node_id`, leaving unplaceable ones pending
    pub fn drain(
        &self,
        registry: &mut NodeRegistry,
        node_id: &str,
    ) -> ClusterletResult<DrainReport> {
        let pod_ids = registry.node(node_id)?.pods.clone();
        let mut report = DrainReport::default();

        for pod_id in pod_ids {
            let cpu_required = match registry
                .unbind(&pod_id)
                .and_then(|_| registry.pod(&pod_id).map(|p| p.cpu_required))
            {
                Ok(cpu) => cpu,
                Err(e) => {
                    error!(
                        node_id = %node_id,
                        pod_id = %pod_id,
                        error = %e,
                        "Failed to detach pod"
                    );
                    report.failed.push(pod_id);
                    continue;
                }
            };

            let Some(target) = self
                .strategy
                .select(registry.nodes(), cpu_required, Some(node_id))
            else {
                warn!(
                    pod_id = %pod_id,
                    cpu_required,
                    "No capacity for drained pod, leaving it pending"
                );
                report.pending.push(pod_id);
                continue;
            };

            match registry.bind(&pod_id, &target) {
                Ok(()) => {
                    debug!(pod_id = %pod_id, from = %node_id, to = %target, "Pod relocated");
                    report.moved.push((pod_id, target));
                }
                Err(e) => {
                    error!(pod_id = %pod_id, target = %target, error = %e, "Failed to rebind pod");
                    report.failed.push(pod_id);
                }
            }
        }

        let node = registry.node(node_id)?;
        info!(
            node_id = %node_id,
            moved = report.moved.len(),
            pending = report.pending.len(),
            failed = report.failed.len(),
            available_cpu = node.available_cpu,
            "Node drained"
        );

        Ok(report)
    }

    /// Try to place every pending pod, oldest first. Returns the pods placed.
    pub fn retry_pending(&self, registry: &mut NodeRegistry) -> Vec<(PodId, NodeId)> {
        let mut placed = Vec::new();

        for (pod_id, cpu_required) in registry.pending_pods() {
            let Some(target) = self.strategy.select(registry.nodes(), cpu_required, None) else {
                debug!(pod_id = %pod_id, cpu_required, "Pending pod still unplaceable");
                continue;
            };

            match registry.bind(&pod_id, &target) {
                Ok(()) => {
                    info!(pod_id = %pod_id, node_id = %target, "Pending pod placed");
                    placed.push((pod_id, target));
                }
                Err(e) => {
                    error!(
                        pod_id = %pod_id,
                        target = %target,
                        error = %e,
                        "Failed to place pending pod"
                    );
                }
            }
        }

        placed
    }
}
