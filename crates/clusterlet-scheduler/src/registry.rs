//! Authoritative node and pod state
//!
//! `NodeRegistry` is plain data plus the primitives that keep node capacity
//! and pod bindings consistent. It is not synchronized itself; the
//! [`Scheduler`](crate::Scheduler) wraps it in a single lock so that every
//! read-then-write sequence built from these primitives is atomic.

use clusterlet_core::{
    ClusterletError, ClusterletResult, ExecutionHandle, Node, NodeId, Pod, PodId, PodStatus,
};
use std::collections::HashMap;
use tracing::debug;

/// Nodes and pods, both kept in creation order
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
    node_index: HashMap<NodeId, usize>,
    pods: Vec<Pod>,
    pod_index: HashMap<PodId, usize>,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a healthy node with its full capacity available
    pub fn insert_node(&mut self, total_cpu: u32, handle: ExecutionHandle) -> NodeId {
        let id = format!("node-{}", self.nodes.len() + 1);
        self.node_index.insert(id.clone(), self.nodes.len());
        self.nodes.push(Node::new(id.clone(), total_cpu, handle));
        id
    }

    /// All nodes in registration order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All pods in creation order
    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    pub fn node(&self, id: &str) -> ClusterletResult<&Node> {
        self.node_index
            .get(id)
            .map(|&idx| &self.nodes[idx])
            .ok_or_else(|| ClusterletError::NodeNotFound(id.to_string()))
    }

    pub fn node_mut(&mut self, id: &str) -> ClusterletResult<&mut Node> {
        match self.node_index.get(id) {
            Some(&idx) => Ok(&mut self.nodes[idx]),
            None => Err(ClusterletError::NodeNotFound(id.to_string())),
        }
    }

    pub fn pod(&self, id: &str) -> ClusterletResult<&Pod> {
        self.pod_index
            .get(id)
            .map(|&idx| &self.pods[idx])
            .ok_or_else(|| ClusterletError::PodNotFound(id.to_string()))
    }

    fn pod_mut(&mut self, id: &str) -> ClusterletResult<&mut Pod> {
        match self.pod_index.get(id) {
            Some(&idx) => Ok(&mut self.pods[idx]),
            None => Err(ClusterletError::PodNotFound(id.to_string())),
        }
    }

    /// Reserve `cpu_required` on `node_id` and record a new running pod there
    pub fn create_pod(&mut self, node_id: &str, cpu_required: u32) -> ClusterletResult<PodId> {
        reserve(self.node_mut(node_id)?, cpu_required)?;

        let id = format!("pod-{}", self.pods.len() + 1);
        self.node_mut(node_id)?.pods.push(id.clone());
        self.pod_index.insert(id.clone(), self.pods.len());
        self.pods
            .push(Pod::new(id.clone(), node_id.to_string(), cpu_required));

        debug!(pod_id = %id, node_id = %node_id, cpu_required, "Pod bound");
        Ok(id)
    }

    /// Bind a pending pod to `node_id`, reserving its CPU there
    pub fn bind(&mut self, pod_id: &str, node_id: &str) -> ClusterletResult<()> {
        let pod = self.pod(pod_id)?;
        if pod.is_running() {
            return Err(ClusterletError::Internal(format!(
                "Pod {} is already bound to {:?}",
                pod_id, pod.node_id
            )));
        }
        let cpu_required = pod.cpu_required;

        let node = self.node_mut(node_id)?;
        reserve(node, cpu_required)?;
        node.pods.push(pod_id.to_string());

        let pod = self.pod_mut(pod_id)?;
        pod.node_id = Some(node_id.to_string());
        pod.status = PodStatus::Running;

        debug!(pod_id = %pod_id, node_id = %node_id, cpu_required, "Pod bound");
        Ok(())
    }

    /// Detach a running pod from its node, returning its CPU to that node.
    ///
    /// The pod is left `PendingReschedule` until it is bound again.
    pub fn unbind(&mut self, pod_id: &str) -> ClusterletResult<NodeId> {
        let pod = self.pod(pod_id)?;
        let Some(node_id) = pod.node_id.clone() else {
            return Err(ClusterletError::Internal(format!(
                "Pod {} has no node to unbind from",
                pod_id
            )));
        };
        let cpu_required = pod.cpu_required;

        let node = self.node_mut(&node_id)?;
        let Some(pos) = node.pods.iter().position(|p| p == pod_id) else {
            return Err(ClusterletError::Internal(format!(
                "Pod {} claims node {} which does not list it",
                pod_id, node_id
            )));
        };
        let total_cpu = node.total_cpu;
        let released = node
            .available_cpu
            .checked_add(cpu_required)
            .filter(|&cpu| cpu <= total_cpu)
            .ok_or_else(|| {
                ClusterletError::Internal(format!(
                    "Releasing {} cpu would exceed capacity of {}",
                    cpu_required, node_id
                ))
            })?;
        node.pods.remove(pos);
        node.available_cpu = released;

        let pod = self.pod_mut(pod_id)?;
        pod.node_id = None;
        pod.status = PodStatus::PendingReschedule;

        debug!(pod_id = %pod_id, node_id = %node_id, "Pod unbound");
        Ok(node_id)
    }

    /// Pending pods in creation order
    pub fn pending_pods(&self) -> Vec<(PodId, u32)> {
        self.pods
            .iter()
            .filter(|p| p.status == PodStatus::PendingReschedule)
            .map(|p| (p.id.clone(), p.cpu_required))
            .collect()
    }

    /// Verify capacity accounting and the node/pod binding relation
    pub fn check_invariants(&self) -> ClusterletResult<()> {
        let mut listed: HashMap<&str, &str> = HashMap::new();

        for node in &self.nodes {
            let mut used: u64 = 0;
            for pod_id in &node.pods {
                if let Some(other) = listed.insert(pod_id.as_str(), node.id.as_str()) {
                    return Err(ClusterletError::Internal(format!(
                        "Pod {} listed by both {} and {}",
                        pod_id, other, node.id
                    )));
                }
                let pod = self.pod(pod_id).map_err(|_| {
                    ClusterletError::Internal(format!(
                        "Node {} lists unknown pod {}",
                        node.id, pod_id
                    ))
                })?;
                if !pod.is_running() || pod.node_id.as_deref() != Some(node.id.as_str()) {
                    return Err(ClusterletError::Internal(format!(
                        "Node {} lists pod {} bound elsewhere",
                        node.id, pod_id
                    )));
                }
                used += u64::from(pod.cpu_required);
            }

            if u64::from(node.available_cpu) + used != u64::from(node.total_cpu) {
                return Err(ClusterletError::Internal(format!(
                    "Node {} accounting mismatch: available {} + used {} != total {}",
                    node.id, node.available_cpu, used, node.total_cpu
                )));
            }
        }

        for pod in &self.pods {
            let listed_by = listed.get(pod.id.as_str()).copied();
            let consistent = match pod.status {
                PodStatus::Running => listed_by.is_some() && listed_by == pod.node_id.as_deref(),
                PodStatus::PendingReschedule => listed_by.is_none() && pod.node_id.is_none(),
            };
            if !consistent {
                return Err(ClusterletError::Internal(format!(
                    "Pod {} ({}) has inconsistent binding {:?}",
                    pod.id, pod.status, pod.node_id
                )));
            }
        }

        Ok(())
    }
}

fn reserve(node: &mut Node, cpu_required: u32) -> ClusterletResult<()> {
    if !node.is_healthy() {
        return Err(ClusterletError::InsufficientCapacity(format!(
            "Node {} is {}",
            node.id, node.status
        )));
    }
    node.available_cpu = node.available_cpu.checked_sub(cpu_required).ok_or_else(|| {
        ClusterletError::InsufficientCapacity(format!(
            "Node {} has {} cpu available, {} required",
            node.id, node.available_cpu, cpu_required
        ))
    })?;
    Ok(())
}
