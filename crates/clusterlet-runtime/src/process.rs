//! Process-based execution port
//!
//! Each node is backed by one OS process. The process only stands in for the
//! node's compute slot; stopping a node kills it, resuming spawns it again.

use async_trait::async_trait;
use clusterlet_core::{ClusterletError, ClusterletResult, ExecutionHandle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::traits::{ExecutionPort, ProbeStatus};

/// Process-based port configuration
#[derive(Debug, Clone)]
pub struct ProcessPortConfig {
    /// Program launched for each node
    pub command: PathBuf,
    /// Arguments for the program
    pub args: Vec<String>,
}

impl Default for ProcessPortConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("sleep"),
            args: vec!["infinity".to_string()],
        }
    }
}

struct ProcessSlot {
    cpu_cores: u32,
    child: Option<Child>,
}

/// Execution port that runs one process per node
pub struct ProcessPort {
    config: ProcessPortConfig,
    slots: Mutex<HashMap<ExecutionHandle, ProcessSlot>>,
}

impl ProcessPort {
    /// Create a new process port
    pub fn new(config: ProcessPortConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Build the command backing a node
    fn build_command(&self, handle: &ExecutionHandle, cpu_cores: u32) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);
        cmd.env("CLUSTERLET_HANDLE", handle.as_str());
        cmd.env("CLUSTERLET_CPU_CORES", cpu_cores.to_string());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn(&self, handle: &ExecutionHandle, cpu_cores: u32) -> ClusterletResult<Child> {
        self.build_command(handle, cpu_cores).spawn().map_err(|e| {
            error!(handle = %handle, error = %e, "Failed to spawn node process");
            ClusterletError::ResourceProvisioning(format!("Failed to spawn node process: {}", e))
        })
    }
}

#[async_trait]
impl ExecutionPort for ProcessPort {
    async fn provision(&self, cpu_cores: u32) -> ClusterletResult<ExecutionHandle> {
        let handle = ExecutionHandle::new(format!("proc-{}", Uuid::new_v4()));
        let child = self.spawn(&handle, cpu_cores)?;

        info!(
            handle = %handle,
            pid = child.id().unwrap_or(0),
            cpu_cores = cpu_cores,
            "Node process started"
        );

        self.slots.lock().await.insert(
            handle.clone(),
            ProcessSlot {
                cpu_cores,
                child: Some(child),
            },
        );
        Ok(handle)
    }

    async fn start(&self, handle: &ExecutionHandle) -> ClusterletResult<()> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(handle).ok_or_else(|| {
            ClusterletError::ResourceProvisioning(format!("Unknown execution handle: {}", handle))
        })?;

        if let Some(child) = slot.child.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                debug!(handle = %handle, "Node process already running");
                return Ok(());
            }
        }

        let child = self.spawn(handle, slot.cpu_cores)?;
        info!(handle = %handle, pid = child.id().unwrap_or(0), "Node process restarted");
        slot.child = Some(child);
        Ok(())
    }

    async fn stop(&self, handle: &ExecutionHandle) -> ClusterletResult<()> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(handle).ok_or_else(|| {
            ClusterletError::ResourceProvisioning(format!("Unknown execution handle: {}", handle))
        })?;

        if let Some(mut child) = slot.child.take() {
            if let Err(e) = child.kill().await {
                // Already exited processes report InvalidInput on kill
                if e.kind() != std::io::ErrorKind::InvalidInput {
                    slot.child = Some(child);
                    return Err(ClusterletError::ResourceProvisioning(format!(
                        "Failed to stop node process: {}",
                        e
                    )));
                }
            }
            info!(handle = %handle, "Node process stopped");
        }
        Ok(())
    }

    async fn probe(&self, handle: &ExecutionHandle) -> ProbeStatus {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(handle) else {
            return ProbeStatus::Unreachable;
        };

        match slot.child.as_mut().map(|c| c.try_wait()) {
            None => ProbeStatus::Stopped,
            Some(Ok(None)) => ProbeStatus::Running,
            Some(Ok(Some(status))) => {
                debug!(handle = %handle, status = %status, "Node process exited");
                ProbeStatus::Stopped
            }
            Some(Err(e)) => {
                warn!(handle = %handle, error = %e, "Failed to inspect node process");
                ProbeStatus::Unreachable
            }
        }
    }

    async fn dispose(&self, handle: &ExecutionHandle) {
        let slot = self.slots.lock().await.remove(handle);
        if let Some(ProcessSlot {
            child: Some(mut child),
            ..
        }) = slot
        {
            if let Err(e) = child.kill().await {
                warn!(handle = %handle, error = %e, "Failed to kill node process on dispose");
            }
        }
        debug!(handle = %handle, "Node process disposed");
    }

    fn name(&self) -> &'static str {
        "process"
    }
}
