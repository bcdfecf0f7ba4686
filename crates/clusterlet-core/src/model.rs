//! Node, Pod, and execution handle type definitions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Node identifier (`node-<n>`, assigned at registration)
pub type NodeId = String;

/// Pod identifier (`pod-<n>`, assigned at placement)
pub type PodId = String;

/// Opaque reference to the resource backing a node.
///
/// Only the execution port interprets the contents; the scheduler stores and
/// hands it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A compute slot with a fixed CPU capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier
    pub id: NodeId,
    /// Total CPU cores, fixed at registration
    pub total_cpu: u32,
    /// CPU cores not claimed by running pods
    pub available_cpu: u32,
    /// Current status
    pub status: NodeStatus,
    /// Assigned pods, in assignment order
    pub pods: Vec<PodId>,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
    /// Last heartbeat timestamp
    pub last_heartbeat: DateTime<Utc>,
    /// Backing resource handle
    pub execution_handle: ExecutionHandle,
    /// Set by an operator on an Unhealthy/Error node; the next heartbeat heals it
    #[serde(default)]
    pub recovery_requested: bool,
}

impl Node {
    /// Create a healthy node with its full capacity available
    pub fn new(id: NodeId, total_cpu: u32, execution_handle: ExecutionHandle) -> Self {
        let now = Utc::now();
        Self {
            id,
            total_cpu,
            available_cpu: total_cpu,
            status: NodeStatus::Healthy,
            pods: Vec::new(),
            created_at: now,
            last_heartbeat: now,
            execution_handle,
            recovery_requested: false,
        }
    }

    /// Check if the node accepts placements
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, NodeStatus::Healthy)
    }

    /// Whether the last heartbeat is strictly older than `timeout` at `now`
    pub fn heartbeat_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_heartbeat > timeout
    }
}

/// Node status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Accepting placements
    Healthy,
    /// Heartbeat timed out
    Unhealthy,
    /// Stopped by an operator
    Stopped,
    /// Backing resource failed a probe
    Error,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Healthy => write!(f, "Healthy"),
            NodeStatus::Unhealthy => write!(f, "Unhealthy"),
            NodeStatus::Stopped => write!(f, "Stopped"),
            NodeStatus::Error => write!(f, "Error"),
        }
    }
}

/// A unit of work holding a fixed amount of CPU
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    /// Unique pod identifier
    pub id: PodId,
    /// Assigned node, `None` while pending reschedule
    pub node_id: Option<NodeId>,
    /// CPU cores required
    pub cpu_required: u32,
    /// Current status
    pub status: PodStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Pod {
    /// Create a running pod bound to `node_id`
    pub fn new(id: PodId, node_id: NodeId, cpu_required: u32) -> Self {
        Self {
            id,
            node_id: Some(node_id),
            cpu_required,
            status: PodStatus::Running,
            created_at: Utc::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, PodStatus::Running)
    }
}

/// Pod status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodStatus {
    Running,
    PendingReschedule,
}

impl std::fmt::Display for PodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PodStatus::Running => write!(f, "Running"),
            PodStatus::PendingReschedule => write!(f, "PendingReschedule"),
        }
    }
}

/// Aggregate view of the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub unhealthy_nodes: usize,
    pub stopped_nodes: usize,
    pub error_nodes: usize,
    /// Total CPU across healthy nodes
    pub total_cpu: u64,
    /// Available CPU across healthy nodes
    pub available_cpu: u64,
    pub running_pods: usize,
    pub pending_pods: usize,
}

impl ClusterSummary {
    /// Build a summary from node and pod snapshots
    pub fn from_parts(nodes: &[Node], pods: &[Pod]) -> Self {
        let mut summary = Self {
            total_nodes: nodes.len(),
            ..Self::default()
        };

        for node in nodes {
            match node.status {
                NodeStatus::Healthy => {
                    summary.healthy_nodes += 1;
                    summary.total_cpu += u64::from(node.total_cpu);
                    summary.available_cpu += u64::from(node.available_cpu);
                }
                NodeStatus::Unhealthy => summary.unhealthy_nodes += 1,
                NodeStatus::Stopped => summary.stopped_nodes += 1,
                NodeStatus::Error => summary.error_nodes += 1,
            }
        }

        summary.running_pods = pods.iter().filter(|p| p.is_running()).count();
        summary.pending_pods = pods.len() - summary.running_pods;
        summary
    }
}

/// Render a timestamp as `DD Month YYYY: HH:MM:SS`
pub fn display_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%d %B %Y: %H:%M:%S").to_string()
}
