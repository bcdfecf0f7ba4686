//! In-memory execution port
//!
//! Simulates node resources without launching anything. Failure knobs let
//! callers exercise provisioning errors, crashed backends and hung probes.

use async_trait::async_trait;
use clusterlet_core::{ClusterletError, ClusterletResult, ExecutionHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::traits::{ExecutionPort, ProbeStatus};

/// Execution port backed by a map of simulated resources
#[derive(Default)]
pub struct MemoryPort {
    resources: RwLock<HashMap<ExecutionHandle, ProbeStatus>>,
    fail_provision: AtomicBool,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    /// Artificial probe latency in milliseconds
    probe_delay_ms: AtomicU64,
}

impl MemoryPort {
    /// Create a new in-memory port
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `provision` calls fail
    pub fn set_fail_provision(&self, fail: bool) {
        self.fail_provision.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `start` calls fail
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `stop` calls fail
    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Delay every probe by `delay`
    pub fn set_probe_delay(&self, delay: Duration) {
        self.probe_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Force the observed state of a resource, e.g. to simulate a crash
    pub async fn set_status(&self, handle: &ExecutionHandle, status: ProbeStatus) {
        self.resources.write().await.insert(handle.clone(), status);
    }

    /// Current simulated state, `None` if unknown or disposed
    pub async fn status(&self, handle: &ExecutionHandle) -> Option<ProbeStatus> {
        self.resources.read().await.get(handle).copied()
    }

    /// Number of live (not disposed) resources
    pub async fn resource_count(&self) -> usize {
        self.resources.read().await.len()
    }

    async fn transition(&self, handle: &ExecutionHandle, to: ProbeStatus) -> ClusterletResult<()> {
        let mut resources = self.resources.write().await;
        match resources.get_mut(handle) {
            Some(status) => {
                *status = to;
                Ok(())
            }
            None => Err(ClusterletError::ResourceProvisioning(format!(
                "Unknown execution handle: {}",
                handle
            ))),
        }
    }
}

#[async_trait]
impl ExecutionPort for MemoryPort {
    async fn provision(&self, cpu_cores: u32) -> ClusterletResult<ExecutionHandle> {
        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(ClusterletError::ResourceProvisioning(
                "Simulated provisioning failure".to_string(),
            ));
        }

        let handle = ExecutionHandle::new(format!("mem-{}", Uuid::new_v4()));
        self.resources
            .write()
            .await
            .insert(handle.clone(), ProbeStatus::Running);

        debug!(handle = %handle, cpu_cores = cpu_cores, "Provisioned in-memory resource");
        Ok(handle)
    }

    async fn start(&self, handle: &ExecutionHandle) -> ClusterletResult<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ClusterletError::ResourceProvisioning(
                "Simulated start failure".to_string(),
            ));
        }
        self.transition(handle, ProbeStatus::Running).await
    }

    async fn stop(&self, handle: &ExecutionHandle) -> ClusterletResult<()> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ClusterletError::ResourceProvisioning(
                "Simulated stop failure".to_string(),
            ));
        }
        self.transition(handle, ProbeStatus::Stopped).await
    }

    async fn probe(&self, handle: &ExecutionHandle) -> ProbeStatus {
        let delay = self.probe_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.resources
            .read()
            .await
            .get(handle)
            .copied()
            .unwrap_or(ProbeStatus::Unreachable)
    }

    async fn dispose(&self, handle: &ExecutionHandle) {
        self.resources.write().await.remove(handle);
        debug!(handle = %handle, "Disposed in-memory resource");
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
