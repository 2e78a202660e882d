//! shard-runtime — group orchestration against a container engine.
//!
//! Launches one container per compute unit, pinned to that unit's cores,
//! and reconstructs the live Group/Shard view purely from labels on the
//! engine's own instances. There is no database: every `list`/`info`/`stop`
//! call re-derives truth from the engine, so out-of-band mutation is
//! always reflected on the next query.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator<E: Engine>
//!   ├── exec   — per-unit launch config (deep copy), create + start
//!   ├── list   — label query → Groups keyed by group-label value
//!   ├── info   — single-group label query, NotFound on zero matches
//!   └── stop   — graceful stop (bounded), optional purge
//! DockerEngine — Engine impl speaking the Docker Engine REST API
//! ```

pub mod docker;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod types;

pub use docker::DockerEngine;
pub use engine::{Engine, EngineContainer, InstanceState, LabelSelector};
pub use error::{EngineError, RuntimeError, RuntimeResult};
pub use orchestrator::Orchestrator;
pub use types::{
    ConfigOverlay, Group, GroupSpec, LaunchConfig, PortBinding, PortSpec, Protocol, Shard,
    GROUP_LABEL, UNIT_LABEL, WEIGHT_ENV, WEIGHT_LABEL,
};
