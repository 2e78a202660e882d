//! Topology error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building or partitioning a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("invalid cpu list '{0}'")]
    InvalidCpuList(String),

    #[error("unknown granularity '{0}' (expected 'node' or 'core')")]
    UnknownGranularity(String),

    #[error("shard count must be at least one")]
    ZeroShards,

    #[error("topology has no usable processing units")]
    EmptyTopology,

    #[error("reading {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected contents at {path}: '{value}'")]
    Malformed { path: PathBuf, value: String },
}
