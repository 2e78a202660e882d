//! The narrow capability boundary between orchestration and any concrete
//! container engine client.
//!
//! The orchestrator only ever needs these six operations; anything that
//! provides them can back a [`crate::Orchestrator`], which is how the
//! engine client can evolve (or be faked in tests) without touching
//! orchestration logic.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::EngineError;
use crate::types::{LaunchConfig, PortBinding};

/// A container listing entry as reported by the engine.
#[derive(Debug, Clone)]
pub struct EngineContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub labels: BTreeMap<String, String>,
    pub ports: Vec<PortBinding>,
}

/// The subset of inspect output orchestration cares about.
#[derive(Debug, Clone, Copy)]
pub struct InstanceState {
    pub running: bool,
}

/// Label filter for listing: presence of a key, or an exact key=value
/// match.
#[derive(Debug, Clone, Copy)]
pub enum LabelSelector<'a> {
    Key(&'a str),
    KeyValue(&'a str, &'a str),
}

/// Container engine capabilities consumed by the orchestrator.
///
/// Statically dispatched; implementations are plugged in as type
/// parameters rather than trait objects.
#[allow(async_fn_in_trait)]
pub trait Engine {
    /// Create an instance from the given launch configuration and return
    /// its engine-assigned id.
    async fn create(&self, config: &LaunchConfig) -> Result<String, EngineError>;

    /// Start a created instance.
    async fn start(&self, id: &str) -> Result<(), EngineError>;

    /// List all instances (running or not) matching the label selector.
    async fn list(
        &self,
        selector: LabelSelector<'_>,
    ) -> Result<Vec<EngineContainer>, EngineError>;

    /// Query an instance's current state.
    async fn inspect(&self, id: &str) -> Result<InstanceState, EngineError>;

    /// Gracefully stop an instance, escalating to forced termination
    /// after `timeout`.
    async fn stop(&self, id: &str, timeout: Duration) -> Result<(), EngineError>;

    /// Remove an instance, optionally with its anonymous volumes.
    async fn remove(&self, id: &str, remove_volumes: bool) -> Result<(), EngineError>;
}
