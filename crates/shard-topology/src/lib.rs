//! shard-topology — hardware topology partitioning.
//!
//! Models the machine as a tree (machine → NUMA nodes → cores → processing
//! units) and splits it into N compute-unit sets, one per shard, weighted
//! by available parallelism rather than naive round-robin. The resulting
//! [`Unit`]s carry a canonical string encoding that survives a round trip
//! through a container runtime's label system, which is how the rest of
//! the system reconstructs shard layout without any storage of its own.
//!
//! # Components
//!
//! - **`cpuset`** — processing-unit index sets and their list encoding
//! - **`topology`** — the object tree and the distribution algorithm
//! - **`sysfs`** — Linux discovery (`/sys/devices/system`)

pub mod cpuset;
pub mod error;
mod sysfs;
pub mod topology;

pub use cpuset::CpuSet;
pub use error::TopologyError;
pub use topology::{Granularity, Topology, Unit};
