//! Group orchestration — launch, observe, and tear down shard groups.
//!
//! The orchestrator holds no state between calls beyond its engine
//! handle. Group and shard views are re-derived from instance labels on
//! every query, so external mutation (a shard killed out of band) shows
//! up on the next call. The weight and unit labels written at launch are
//! the only record of the layout; if one is missing or unparseable on an
//! instance we created, the layout can no longer be trusted and the
//! process aborts rather than mis-reporting shard concurrency.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::info;

use shard_topology::Unit;

use crate::engine::{Engine, EngineContainer, LabelSelector};
use crate::error::{RuntimeError, RuntimeResult};
use crate::types::{
    Group, GroupSpec, LaunchConfig, Shard, GROUP_LABEL, UNIT_LABEL, WEIGHT_ENV, WEIGHT_LABEL,
};

/// Drives a container engine to run label-tagged shard groups.
pub struct Orchestrator<E> {
    engine: E,
}

impl<E: Engine> Orchestrator<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Launch one shard per unit in the requested layout.
    ///
    /// Shards are created and started sequentially; a failure launching
    /// shard `k` returns immediately and leaves shards `0..k` running.
    /// There is no rollback — the operator inspects `list` output and
    /// stops or retries.
    pub async fn exec(&self, spec: &GroupSpec) -> RuntimeResult<Group> {
        let base = base_config(spec);

        for unit in &spec.layout {
            // Every shard mutates its own copy; labels and environment
            // must never leak between shards.
            let mut config = base.clone();
            config.env.push(format!("{WEIGHT_ENV}={}", unit.weight()));
            config
                .labels
                .insert(GROUP_LABEL.to_string(), spec.name.clone());
            config.labels.insert(UNIT_LABEL.to_string(), unit.encode());
            config
                .labels
                .insert(WEIGHT_LABEL.to_string(), unit.weight().to_string());
            config.cpuset_cpus = unit.encode();

            let id = self.engine.create(&config).await?;
            info!(%id, group = %spec.name, unit = %unit.encode(), "instance created");

            self.engine.start(&id).await?;
            info!(%id, "instance started");
        }

        self.info(&spec.name).await
    }

    /// Reconstruct every group from the engine's labeled instances,
    /// including stopped ones.
    pub async fn list(&self) -> RuntimeResult<Vec<Group>> {
        let containers = self.engine.list(LabelSelector::Key(GROUP_LABEL)).await?;

        let mut groups: BTreeMap<String, Group> = BTreeMap::new();
        for container in containers {
            // The selector guarantees the label is present.
            let Some(name) = container.labels.get(GROUP_LABEL).cloned() else {
                continue;
            };
            groups
                .entry(name.clone())
                .or_insert_with(|| Group {
                    name,
                    image: container.image.clone(),
                    shards: Vec::new(),
                })
                .shards
                .push(shard_from(container));
        }

        Ok(groups.into_values().collect())
    }

    /// Reconstruct a single group by name.
    pub async fn info(&self, name: &str) -> RuntimeResult<Group> {
        let containers = self
            .engine
            .list(LabelSelector::KeyValue(GROUP_LABEL, name))
            .await?;

        if containers.is_empty() {
            return Err(RuntimeError::GroupNotFound(name.to_string()));
        }

        let image = containers[0].image.clone();
        Ok(Group {
            name: name.to_string(),
            image,
            shards: containers.into_iter().map(shard_from).collect(),
        })
    }

    /// Stop every shard in the group, gracefully within `timeout`.
    ///
    /// Stopping an instance that is not running is a no-op. With `purge`
    /// the instances (and their anonymous volumes) are removed afterwards.
    /// The first engine error aborts the remaining shards.
    pub async fn stop(
        &self,
        name: &str,
        purge: bool,
        timeout: Duration,
    ) -> RuntimeResult<()> {
        let group = self.info(name).await?;

        for shard in &group.shards {
            let state = self.engine.inspect(&shard.id).await?;
            if state.running {
                self.engine.stop(&shard.id, timeout).await?;
                info!(id = %shard.id, group = %name, "instance stopped");
            }

            if purge {
                self.engine.remove(&shard.id, true).await?;
                info!(id = %shard.id, group = %name, "instance removed");
            }
        }

        Ok(())
    }
}

fn base_config(spec: &GroupSpec) -> LaunchConfig {
    let mut config = match &spec.overlay {
        Some(overlay) => LaunchConfig::from_overlay(overlay),
        None => LaunchConfig::default(),
    };
    config.image = spec.image.clone();
    config.ports = spec.ports.clone();
    config
}

fn shard_from(container: EngineContainer) -> Shard {
    let unit = match (
        container.labels.get(UNIT_LABEL),
        container.labels.get(WEIGHT_LABEL),
    ) {
        (Some(encoding), Some(weight)) => Unit::from_label_parts(encoding, weight),
        _ => panic!(
            "instance {} is missing its unit/weight labels",
            container.id
        ),
    };

    Shard {
        name: container.name,
        id: container.id,
        status: container.status,
        unit,
        ports: container.ports,
    }
}
