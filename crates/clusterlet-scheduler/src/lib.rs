//! clusterlet-scheduler: CPU bin-packing scheduler
//!
//! This crate owns the cluster state and everything that mutates it:
//! - Node registry with atomic capacity accounting
//! - Best-fit placement decisions
//! - Draining failed or stopped nodes and retrying pending pods
//! - Periodic heartbeat and probe sweep

pub mod monitor;
pub mod placement;
pub mod registry;
pub mod rescheduler;
pub mod scheduler;

pub use monitor::{HealthMonitor, MonitorHandle, SweepReport};
pub use placement::{BestFit, PlacementStrategy};
pub use registry::NodeRegistry;
pub use rescheduler::{DrainReport, Rescheduler};
pub use scheduler::Scheduler;
