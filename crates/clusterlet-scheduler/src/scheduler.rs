//! Main scheduler logic
//!
//! `Scheduler` exposes the cluster operations. All registry state sits behind
//! one lock; execution port calls happen before the lock is taken and their
//! result is committed afterwards, so a slow backend never blocks placement.

use chrono::{DateTime, Utc};
use clusterlet_core::{
    ClusterSummary, ClusterletError, ClusterletResult, ExecutionHandle, Node, NodeId, NodeStatus,
    Pod, PodId,
};
use clusterlet_runtime::ExecutionPort;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::placement::{BestFit, PlacementStrategy};
use crate::registry::NodeRegistry;
use crate::rescheduler::{DrainReport, Rescheduler};

/// Scheduler owns the node registry and every operation that mutates it
pub struct Scheduler {
    /// Nodes and pods
    registry: RwLock<NodeRegistry>,
    /// Backend running node resources
    port: Arc<dyn ExecutionPort>,
    /// Placement strategy
    placement_strategy: Arc<dyn PlacementStrategy>,
    /// Drain and retry logic
    rescheduler: Rescheduler,
    /// Held across a whole stop or resume, port call included
    lifecycle: Mutex<()>,
}

impl Scheduler {
    /// Create a new best-fit scheduler
    pub fn new(port: Arc<dyn ExecutionPort>) -> Self {
        Self::with_strategy(port, Arc::new(BestFit))
    }

    /// Create a scheduler with a custom placement strategy
    pub fn with_strategy(
        port: Arc<dyn ExecutionPort>,
        placement_strategy: Arc<dyn PlacementStrategy>,
    ) -> Self {
        info!(
            backend = port.name(),
            strategy = placement_strategy.name(),
            "Scheduler initialized"
        );

        Self {
            registry: RwLock::new(NodeRegistry::new()),
            port,
            rescheduler: Rescheduler::new(placement_strategy.clone()),
            placement_strategy,
            lifecycle: Mutex::new(()),
        }
    }

    /// The execution backend
    pub fn port(&self) -> &Arc<dyn ExecutionPort> {
        &self.port
    }

    /// Register a node, provisioning its backing resource first
    pub async fn register_node(&self, cpu_cores: u32) -> ClusterletResult<NodeId> {
        if cpu_cores == 0 {
            return Err(ClusterletError::InvalidInput(
                "cpu_cores must be a positive integer".to_string(),
            ));
        }

        let handle = self
            .port
            .provision(cpu_cores)
            .await
            .map_err(into_provisioning)?;

        let id = self.registry.write().await.insert_node(cpu_cores, handle.clone());

        info!(node_id = %id, cpu_cores, handle = %handle, "Node registered");
        Ok(id)
    }

    /// Get a node by id
    pub async fn get_node(&self, id: &str) -> ClusterletResult<Node> {
        self.registry.read().await.node(id).cloned()
    }

    /// List all nodes in registration order
    pub async fn list_nodes(&self) -> Vec<Node> {
        self.registry.read().await.nodes().to_vec()
    }

    /// Get a pod by id
    pub async fn get_pod(&self, id: &str) -> ClusterletResult<Pod> {
        self.registry.read().await.pod(id).cloned()
    }

    /// List all pods in creation order
    pub async fn list_pods(&self) -> Vec<Pod> {
        self.registry.read().await.pods().to_vec()
    }

    /// Aggregate node and pod counts
    pub async fn summary(&self) -> ClusterSummary {
        let registry = self.registry.read().await;
        ClusterSummary::from_parts(registry.nodes(), registry.pods())
    }

    /// Verify capacity accounting across the whole registry
    pub async fn check_invariants(&self) -> ClusterletResult<()> {
        self.registry.read().await.check_invariants()
    }

    /// Refresh a node's heartbeat.
    ///
    /// Never changes status on its own. The one exception is a node an
    /// operator marked recovered, which the heartbeat brings back to Healthy.
    pub async fn record_heartbeat(&self, id: &str) -> ClusterletResult<()> {
        let mut registry = self.registry.write().await;
        let node = registry.node_mut(id)?;
        node.last_heartbeat = Utc::now();

        if !(node.recovery_requested
            && matches!(node.status, NodeStatus::Unhealthy | NodeStatus::Error))
        {
            debug!(node_id = %id, "Heartbeat recorded");
            return Ok(());
        }

        let previous = node.status;
        node.status = NodeStatus::Healthy;
        node.recovery_requested = false;
        info!(node_id = %id, from = %previous, "Node recovered on heartbeat");

        let placed = self.rescheduler.retry_pending(&mut registry);
        if !placed.is_empty() {
            info!(node_id = %id, placed = placed.len(), "Pending pods placed after recovery");
        }
        Ok(())
    }

    /// Let the next heartbeat from an Unhealthy or Error node heal it
    pub async fn mark_recovered(&self, id: &str) -> ClusterletResult<()> {
        let mut registry = self.registry.write().await;
        let node = registry.node_mut(id)?;

        match node.status {
            NodeStatus::Unhealthy | NodeStatus::Error => {
                node.recovery_requested = true;
                info!(
                    node_id = %id,
                    status = %node.status,
                    "Node marked recovered, awaiting heartbeat"
                );
                Ok(())
            }
            NodeStatus::Healthy => Err(ClusterletError::InvalidInput(format!(
                "Node {} is already healthy",
                id
            ))),
            NodeStatus::Stopped => Err(ClusterletError::InvalidInput(format!(
                "Node {} is stopped, resume it instead",
                id
            ))),
        }
    }

    /// Stop a node's resource and drain its pods. Stopping twice is a no-op.
    ///
    /// Serialized with `resume_node`, so a stop that returns `Ok` is never
    /// undone by a resume that was already in flight.
    pub async fn stop_node(&self, id: &str) -> ClusterletResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let (status, handle) = self.node_handle(id).await?;
        if status == NodeStatus::Stopped {
            debug!(node_id = %id, "Node already stopped");
            return Ok(());
        }

        self.port.stop(&handle).await.map_err(into_provisioning)?;

        let mut registry = self.registry.write().await;
        let node = registry.node_mut(id)?;
        if node.status == NodeStatus::Stopped {
            return Ok(());
        }
        node.status = NodeStatus::Stopped;
        node.recovery_requested = false;
        info!(node_id = %id, "Node stopped");

        self.rescheduler.drain(&mut registry, id)?;
        Ok(())
    }

    /// Restart a node's resource, mark it Healthy and retry pending pods
    pub async fn resume_node(&self, id: &str) -> ClusterletResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let (status, handle) = self.node_handle(id).await?;
        if status == NodeStatus::Healthy {
            debug!(node_id = %id, "Node already healthy");
            return Ok(());
        }

        if let Err(e) = self.port.start(&handle).await {
            warn!(node_id = %id, error = %e, "Failed to start node resource");
            return Err(into_provisioning(e));
        }

        let mut registry = self.registry.write().await;
        let node = registry.node_mut(id)?;
        if node.status != status {
            // Recovered by heartbeat meanwhile, its newer state stands
            debug!(
                node_id = %id,
                from = %status,
                to = %node.status,
                "Node changed during resume"
            );
            return Ok(());
        }
        let previous = node.status;
        node.status = NodeStatus::Healthy;
        node.recovery_requested = false;
        node.last_heartbeat = Utc::now();
        info!(node_id = %id, from = %previous, "Node resumed");

        let placed = self.rescheduler.retry_pending(&mut registry);
        if !placed.is_empty() {
            info!(node_id = %id, placed = placed.len(), "Pending pods placed after resume");
        }
        Ok(())
    }

    /// Place a new pod on the best-fit node
    pub async fn launch_pod(&self, cpu_required: u32) -> ClusterletResult<PodId> {
        if cpu_required == 0 {
            return Err(ClusterletError::InvalidInput(
                "cpu_required must be a positive integer".to_string(),
            ));
        }

        // Select and reserve under one write guard so concurrent launches
        // cannot both claim the same headroom.
        let mut registry = self.registry.write().await;
        let node_id = self
            .placement_strategy
            .select(registry.nodes(), cpu_required, None)
            .ok_or_else(|| {
                ClusterletError::InsufficientCapacity(format!(
                    "No healthy node has {} cpu available",
                    cpu_required
                ))
            })?;
        let pod_id = registry.create_pod(&node_id, cpu_required)?;

        info!(pod_id = %pod_id, node_id = %node_id, cpu_required, "Pod launched");
        Ok(pod_id)
    }

    /// Move a Healthy node to `status` and drain it.
    ///
    /// Skipped (returns `None`) when the node already left Healthy, or when
    /// `stale_heartbeat` is given and a newer heartbeat arrived since.
    pub async fn fail_node(
        &self,
        id: &str,
        status: NodeStatus,
        stale_heartbeat: Option<DateTime<Utc>>,
    ) -> ClusterletResult<Option<DrainReport>> {
        if status == NodeStatus::Healthy {
            return Err(ClusterletError::Internal(
                "fail_node called with Healthy target".to_string(),
            ));
        }

        let mut registry = self.registry.write().await;
        let node = registry.node_mut(id)?;
        if !node.is_healthy() {
            return Ok(None);
        }
        if let Some(seen) = stale_heartbeat {
            if node.last_heartbeat != seen {
                debug!(node_id = %id, "Heartbeat arrived during sweep, keeping node");
                return Ok(None);
            }
        }

        node.status = status;
        warn!(node_id = %id, status = %status, "Node failed");

        self.rescheduler.drain(&mut registry, id).map(Some)
    }

    /// Dispose of every node's backing resource. Used at shutdown.
    pub async fn dispose_all(&self) {
        let handles: Vec<(NodeId, ExecutionHandle)> = {
            let registry = self.registry.read().await;
            registry
                .nodes()
                .iter()
                .map(|n| (n.id.clone(), n.execution_handle.clone()))
                .collect()
        };

        for (id, handle) in handles {
            self.port.dispose(&handle).await;
            debug!(node_id = %id, handle = %handle, "Node resource disposed");
        }
    }

    async fn node_handle(&self, id: &str) -> ClusterletResult<(NodeStatus, ExecutionHandle)> {
        let registry = self.registry.read().await;
        let node = registry.node(id)?;
        Ok((node.status, node.execution_handle.clone()))
    }
}

fn into_provisioning(err: ClusterletError) -> ClusterletError {
    if matches!(err, ClusterletError::ResourceProvisioning(_)) {
        return err;
    }
    error!(error = %err, "Execution backend failure");
    ClusterletError::ResourceProvisioning(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clusterlet_core::PodStatus;
    use clusterlet_runtime::{MemoryPort, ProbeStatus};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn scheduler() -> (Scheduler, Arc<MemoryPort>) {
        let port = Arc::new(MemoryPort::new());
        (Scheduler::new(port.clone()), port)
    }

    /// Memory port whose `start` parks after starting until released
    #[derive(Default)]
    struct GatedPort {
        inner: MemoryPort,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ExecutionPort for GatedPort {
        async fn provision(&self, cpu_cores: u32) -> ClusterletResult<ExecutionHandle> {
            self.inner.provision(cpu_cores).await
        }

        async fn start(&self, handle: &ExecutionHandle) -> ClusterletResult<()> {
            self.inner.start(handle).await?;
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }

        async fn stop(&self, handle: &ExecutionHandle) -> ClusterletResult<()> {
            self.inner.stop(handle).await
        }

        async fn probe(&self, handle: &ExecutionHandle) -> ProbeStatus {
            self.inner.probe(handle).await
        }

        async fn dispose(&self, handle: &ExecutionHandle) {
            self.inner.dispose(handle).await
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_register_node() {
        let (scheduler, port) = scheduler();
        let id = scheduler.register_node(4).await.unwrap();

        let node = scheduler.get_node(&id).await.unwrap();
        assert_eq!(id, "node-1");
        assert_eq!(node.total_cpu, 4);
        assert_eq!(node.available_cpu, 4);
        assert_eq!(node.status, NodeStatus::Healthy);
        assert_eq!(
            port.status(&node.execution_handle).await,
            Some(ProbeStatus::Running)
        );
    }

    #[tokio::test]
    async fn test_register_node_rejects_zero() {
        let (scheduler, _) = scheduler();
        let err = scheduler.register_node(0).await.unwrap_err();
        assert!(matches!(err, ClusterletError::InvalidInput(_)));
        assert!(scheduler.list_nodes().await.is_empty());
    }

    #[tokio::test]
    async fn test_register_node_provisioning_failure() {
        let (scheduler, port) = scheduler();
        port.set_fail_provision(true);

        let err = scheduler.register_node(4).await.unwrap_err();
        assert!(matches!(err, ClusterletError::ResourceProvisioning(_)));
        assert!(scheduler.list_nodes().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let (scheduler, _) = scheduler();
        assert!(scheduler.get_node("node-1").await.unwrap_err().is_not_found());
        assert!(scheduler.get_pod("pod-1").await.unwrap_err().is_not_found());
        assert!(scheduler
            .record_heartbeat("node-1")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(scheduler.stop_node("node-1").await.unwrap_err().is_not_found());
        assert!(scheduler.resume_node("node-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_launch_pod_rejects_zero() {
        let (scheduler, _) = scheduler();
        scheduler.register_node(4).await.unwrap();
        let err = scheduler.launch_pod(0).await.unwrap_err();
        assert!(matches!(err, ClusterletError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_heartbeat_does_not_heal() {
        let (scheduler, _) = scheduler();
        let id = scheduler.register_node(4).await.unwrap();
        scheduler
            .fail_node(&id, NodeStatus::Unhealthy, None)
            .await
            .unwrap();

        let before = scheduler.get_node(&id).await.unwrap().last_heartbeat;
        tokio::time::sleep(Duration::from_millis(5)).await;
        scheduler.record_heartbeat(&id).await.unwrap();

        let node = scheduler.get_node(&id).await.unwrap();
        assert_eq!(node.status, NodeStatus::Unhealthy);
        assert!(node.last_heartbeat > before);
    }

    #[tokio::test]
    async fn test_mark_recovered_then_heartbeat() {
        let (scheduler, _) = scheduler();
        let id = scheduler.register_node(4).await.unwrap();
        scheduler.launch_pod(2).await.unwrap();
        scheduler
            .fail_node(&id, NodeStatus::Error, None)
            .await
            .unwrap();
        assert_eq!(
            scheduler.get_pod("pod-1").await.unwrap().status,
            PodStatus::PendingReschedule
        );

        scheduler.mark_recovered(&id).await.unwrap();
        scheduler.record_heartbeat(&id).await.unwrap();

        let node = scheduler.get_node(&id).await.unwrap();
        assert_eq!(node.status, NodeStatus::Healthy);
        assert!(!node.recovery_requested);
        assert_eq!(node.available_cpu, 2);
        assert_eq!(
            scheduler.get_pod("pod-1").await.unwrap().status,
            PodStatus::Running
        );
        scheduler.check_invariants().await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_recovered_rejects_healthy_and_stopped() {
        let (scheduler, _) = scheduler();
        let id = scheduler.register_node(4).await.unwrap();
        assert!(matches!(
            scheduler.mark_recovered(&id).await,
            Err(ClusterletError::InvalidInput(_))
        ));

        scheduler.stop_node(&id).await.unwrap();
        assert!(matches!(
            scheduler.mark_recovered(&id).await,
            Err(ClusterletError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_node_idempotent() {
        let (scheduler, port) = scheduler();
        let id = scheduler.register_node(4).await.unwrap();

        scheduler.stop_node(&id).await.unwrap();
        port.set_fail_stop(true);
        scheduler.stop_node(&id).await.unwrap();

        let node = scheduler.get_node(&id).await.unwrap();
        assert_eq!(node.status, NodeStatus::Stopped);
        assert_eq!(
            port.status(&node.execution_handle).await,
            Some(ProbeStatus::Stopped)
        );
    }

    #[tokio::test]
    async fn test_stop_failure_leaves_node_untouched() {
        let (scheduler, port) = scheduler();
        let id = scheduler.register_node(4).await.unwrap();
        scheduler.launch_pod(2).await.unwrap();
        port.set_fail_stop(true);

        let err = scheduler.stop_node(&id).await.unwrap_err();
        assert!(matches!(err, ClusterletError::ResourceProvisioning(_)));

        let node = scheduler.get_node(&id).await.unwrap();
        assert_eq!(node.status, NodeStatus::Healthy);
        assert_eq!(node.pods.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_failure_keeps_node_stopped() {
        let (scheduler, port) = scheduler();
        let id = scheduler.register_node(4).await.unwrap();
        scheduler.stop_node(&id).await.unwrap();
        port.set_fail_start(true);

        let err = scheduler.resume_node(&id).await.unwrap_err();
        assert!(matches!(err, ClusterletError::ResourceProvisioning(_)));
        assert_eq!(
            scheduler.get_node(&id).await.unwrap().status,
            NodeStatus::Stopped
        );
    }

    #[tokio::test]
    async fn test_resume_refreshes_heartbeat() {
        let (scheduler, _) = scheduler();
        let id = scheduler.register_node(4).await.unwrap();
        scheduler
            .fail_node(&id, NodeStatus::Unhealthy, None)
            .await
            .unwrap();
        let stale = scheduler.get_node(&id).await.unwrap().last_heartbeat;

        tokio::time::sleep(Duration::from_millis(5)).await;
        scheduler.resume_node(&id).await.unwrap();

        let node = scheduler.get_node(&id).await.unwrap();
        assert_eq!(node.status, NodeStatus::Healthy);
        assert!(node.last_heartbeat > stale);
    }

    #[tokio::test]
    async fn test_stop_during_resume_is_not_overwritten() {
        let port = Arc::new(GatedPort::default());
        let scheduler = Arc::new(Scheduler::new(port.clone()));
        let id = scheduler.register_node(4).await.unwrap();
        scheduler
            .fail_node(&id, NodeStatus::Unhealthy, None)
            .await
            .unwrap();

        let resume = tokio::spawn({
            let scheduler = scheduler.clone();
            let id = id.clone();
            async move { scheduler.resume_node(&id).await }
        });
        port.started.notified().await;

        let stop = tokio::spawn({
            let scheduler = scheduler.clone();
            let id = id.clone();
            async move { scheduler.stop_node(&id).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stop.is_finished());

        port.release.notify_one();
        resume.await.unwrap().unwrap();
        stop.await.unwrap().unwrap();

        let node = scheduler.get_node(&id).await.unwrap();
        assert_eq!(node.status, NodeStatus::Stopped);
        assert_eq!(
            port.inner.status(&node.execution_handle).await,
            Some(ProbeStatus::Stopped)
        );
        assert!(matches!(
            scheduler.launch_pod(1).await,
            Err(ClusterletError::InsufficientCapacity(_))
        ));
        scheduler.check_invariants().await.unwrap();
    }

    #[tokio::test]
    async fn test_resume_yields_to_heartbeat_recovery() {
        let port = Arc::new(GatedPort::default());
        let scheduler = Arc::new(Scheduler::new(port.clone()));
        let id = scheduler.register_node(4).await.unwrap();
        scheduler
            .fail_node(&id, NodeStatus::Error, None)
            .await
            .unwrap();
        scheduler.mark_recovered(&id).await.unwrap();

        let resume = tokio::spawn({
            let scheduler = scheduler.clone();
            let id = id.clone();
            async move { scheduler.resume_node(&id).await }
        });
        port.started.notified().await;
        scheduler.record_heartbeat(&id).await.unwrap();

        port.release.notify_one();
        resume.await.unwrap().unwrap();

        let node = scheduler.get_node(&id).await.unwrap();
        assert_eq!(node.status, NodeStatus::Healthy);
        assert!(!node.recovery_requested);
        scheduler.check_invariants().await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_node_skips_fresh_heartbeat() {
        let (scheduler, _) = scheduler();
        let id = scheduler.register_node(4).await.unwrap();
        let seen = scheduler.get_node(&id).await.unwrap().last_heartbeat;

        tokio::time::sleep(Duration::from_millis(5)).await;
        scheduler.record_heartbeat(&id).await.unwrap();

        let report = scheduler
            .fail_node(&id, NodeStatus::Unhealthy, Some(seen))
            .await
            .unwrap();
        assert!(report.is_none());
        assert_eq!(
            scheduler.get_node(&id).await.unwrap().status,
            NodeStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_summary_and_dispose_all() {
        let (scheduler, port) = scheduler();
        scheduler.register_node(4).await.unwrap();
        scheduler.register_node(2).await.unwrap();
        scheduler.launch_pod(3).await.unwrap();

        let summary = scheduler.summary().await;
        assert_eq!(summary.total_nodes, 2);
        assert_eq!(summary.total_cpu, 6);
        assert_eq!(summary.available_cpu, 3);
        assert_eq!(summary.running_pods, 1);

        scheduler.dispose_all().await;
        assert_eq!(port.resource_count().await, 0);
    }
}
