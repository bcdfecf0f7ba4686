//! Execution port trait definitions

use async_trait::async_trait;
use clusterlet_core::{ClusterletResult, ExecutionHandle};

/// Observed state of a node's backing resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Running,
    Stopped,
    Unreachable,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Running => write!(f, "running"),
            ProbeStatus::Stopped => write!(f, "stopped"),
            ProbeStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Lifecycle operations on the resource backing a node.
///
/// Calls may be slow; the scheduler never holds its registry lock across them.
#[async_trait]
pub trait ExecutionPort: Send + Sync {
    /// Create and start a resource sized for `cpu_cores`
    async fn provision(&self, cpu_cores: u32) -> ClusterletResult<ExecutionHandle>;

    /// Start a previously stopped resource
    async fn start(&self, handle: &ExecutionHandle) -> ClusterletResult<()>;

    /// Stop a running resource, keeping it restartable
    async fn stop(&self, handle: &ExecutionHandle) -> ClusterletResult<()>;

    /// Inspect the resource
    async fn probe(&self, handle: &ExecutionHandle) -> ProbeStatus;

    /// Release the resource for good. Best-effort.
    async fn dispose(&self, handle: &ExecutionHandle);

    /// Get the backend name
    fn name(&self) -> &'static str;
}
