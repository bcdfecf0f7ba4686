//! clusterlet-runtime: Execution port abstraction
//!
//! The scheduler never talks to a concrete backend. It drives node resources
//! through the [`ExecutionPort`] trait, implemented here by:
//! - [`ProcessPort`]: one OS process per node
//! - [`MemoryPort`]: an in-memory simulation with failure injection

pub mod memory;
pub mod process;
pub mod traits;

pub use memory::MemoryPort;
pub use process::{ProcessPort, ProcessPortConfig};
pub use traits::{ExecutionPort, ProbeStatus};
