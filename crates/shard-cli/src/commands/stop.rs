use std::time::Duration;

use shard_frontend::Frontend;
use shard_runtime::{DockerEngine, Orchestrator};

pub async fn stop(
    group: &str,
    purge: bool,
    stop_timeout: u64,
    lb: Option<&str>,
) -> anyhow::Result<()> {
    let mut frontend = match lb {
        Some(uri) => Some(Frontend::new(uri)?),
        None => None,
    };
    let orchestrator = Orchestrator::new(DockerEngine::from_env()?);

    // Deregister before stopping so the balancer drains first.
    if let Some(front) = frontend.as_mut() {
        let observed = orchestrator.info(group).await?;
        front.remove_service(group, &observed.shards).await?;
    }

    orchestrator
        .stop(group, purge, Duration::from_secs(stop_timeout))
        .await?;

    Ok(())
}
