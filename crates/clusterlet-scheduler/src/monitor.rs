//! Health monitor: one periodic sweep over all nodes.
//!
//! Each sweep marks Healthy nodes whose heartbeat is older than the timeout
//! as Unhealthy, and probes the rest through the execution port. Probes run
//! concurrently outside the registry lock, each bounded by a timeout, so one
//! hung backend cannot stall the sweep.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clusterlet_core::{ClusterletResult, ExecutionHandle, MonitorConfig, NodeId, NodeStatus};
use clusterlet_runtime::ProbeStatus;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::scheduler::Scheduler;

/// What a single sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Healthy nodes examined
    pub checked: usize,
    /// Nodes moved to Unhealthy for a stale heartbeat
    pub timed_out: Vec<NodeId>,
    /// Nodes moved to Error by a failed probe
    pub errored: Vec<NodeId>,
    /// Nodes whose probe did not answer in time
    pub inconclusive: Vec<NodeId>,
}

/// Periodic liveness checker
pub struct HealthMonitor {
    scheduler: Arc<Scheduler>,
    config: MonitorConfig,
    heartbeat_timeout: ChronoDuration,
}

/// Handle to a running monitor task
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the task and wait for its in-flight sweep to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Health monitor task ended abnormally");
        }
    }
}

impl HealthMonitor {
    /// Create a new health monitor. Fails if the heartbeat timeout does not
    /// fit a timestamp delta.
    pub fn new(scheduler: Arc<Scheduler>, config: MonitorConfig) -> ClusterletResult<Self> {
        let heartbeat_timeout = config.heartbeat_timeout_delta()?;
        Ok(Self {
            scheduler,
            config,
            heartbeat_timeout,
        })
    }

    /// Run a sweep against the current time
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Run a sweep as if the current time were `now`.
    ///
    /// Only Healthy nodes are timed out or probed; an Unhealthy node with a
    /// dead backend stays Unhealthy.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let timeout = self.heartbeat_timeout;
        let mut report = SweepReport::default();

        let mut stale: Vec<(NodeId, DateTime<Utc>)> = Vec::new();
        let mut live: Vec<(NodeId, ExecutionHandle)> = Vec::new();
        for node in self.scheduler.list_nodes().await {
            if !node.is_healthy() {
                continue;
            }
            report.checked += 1;
            if node.heartbeat_expired(now, timeout) {
                stale.push((node.id, node.last_heartbeat));
            } else {
                live.push((node.id, node.execution_handle));
            }
        }

        for (id, seen) in stale {
            if self
                .transition(&id, NodeStatus::Unhealthy, Some(seen))
                .await
            {
                report.timed_out.push(id);
            }
        }

        let probe_timeout = self.config.probe_timeout();
        let port = self.scheduler.port().clone();
        let probes = live.into_iter().map(|(id, handle)| {
            let port = port.clone();
            async move {
                let result = tokio::time::timeout(probe_timeout, port.probe(&handle)).await;
                (id, result)
            }
        });

        for (id, result) in join_all(probes).await {
            match result {
                Ok(ProbeStatus::Running) => {}
                Ok(status) => {
                    warn!(node_id = %id, probe = %status, "Node resource not running");
                    if self.transition(&id, NodeStatus::Error, None).await {
                        report.errored.push(id);
                    }
                }
                Err(_) => {
                    warn!(
                        node_id = %id,
                        timeout_secs = probe_timeout.as_secs(),
                        "Probe timed out"
                    );
                    report.inconclusive.push(id);
                }
            }
        }

        report
    }

    /// Apply one failure transition; `true` when the node actually changed
    async fn transition(
        &self,
        id: &str,
        status: NodeStatus,
        stale_heartbeat: Option<DateTime<Utc>>,
    ) -> bool {
        match self.scheduler.fail_node(id, status, stale_heartbeat).await {
            Ok(Some(drain)) => {
                info!(
                    node_id = %id,
                    status = %status,
                    moved = drain.moved.len(),
                    pending = drain.pending.len(),
                    "Node evicted"
                );
                if !drain.failed.is_empty() {
                    error!(node_id = %id, failed = ?drain.failed, "Pods could not be relocated");
                }
                true
            }
            Ok(None) => false,
            Err(e) if e.is_not_found() => {
                debug!(node_id = %id, "Node disappeared during sweep");
                false
            }
            Err(e) => {
                error!(node_id = %id, error = %e, "Failed to evict node");
                false
            }
        }
    }

    /// Spawn the periodic sweep task
    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(shutdown_rx));
        MonitorHandle {
            shutdown_tx,
            handle,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.sweep_interval().max(Duration::from_millis(100));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = period.as_secs(),
            heartbeat_timeout_secs = self.config.heartbeat_timeout_secs,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    break;
                }
            }

            // Runs outside the select so shutdown never cuts a sweep short
            let report = self.sweep().await;
            if !report.timed_out.is_empty() || !report.errored.is_empty() {
                info!(
                    checked = report.checked,
                    timed_out = report.timed_out.len(),
                    errored = report.errored.len(),
                    "Sweep finished"
                );
            } else {
                debug!(checked = report.checked, "Sweep finished");
            }
        }

        info!("Health monitor stopped");
    }
}
