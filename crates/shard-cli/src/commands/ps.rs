use shard_runtime::{DockerEngine, Orchestrator};

pub async fn ps() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(DockerEngine::from_env()?);
    let groups = orchestrator.list().await?;

    if groups.is_empty() {
        println!("no sharded container groups found");
        return Ok(());
    }

    for group in &groups {
        super::print_group(group);
    }

    Ok(())
}
