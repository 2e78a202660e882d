use std::path::PathBuf;

use tracing::info;

use shard_frontend::Frontend;
use shard_runtime::{ConfigOverlay, DockerEngine, GroupSpec, Orchestrator, PortSpec};
use shard_topology::{Granularity, Topology, Unit};

pub struct RunArgs {
    pub image: String,
    pub group: Option<String>,
    pub size: Option<usize>,
    pub granularity: String,
    pub ports: Vec<String>,
    pub config: Option<PathBuf>,
    pub lb: Option<String>,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    // Everything local is validated before the first remote call.
    let granularity: Granularity = args.granularity.parse()?;
    let ports = args
        .ports
        .iter()
        .map(|p| p.parse::<PortSpec>())
        .collect::<Result<Vec<_>, _>>()?;
    let overlay = match &args.config {
        Some(path) => Some(ConfigOverlay::from_file(path)?),
        None => None,
    };
    let mut frontend = match &args.lb {
        Some(uri) => Some(Frontend::new(uri)?),
        None => None,
    };

    let topology = Topology::discover()?;
    let size = args.size.unwrap_or_else(|| topology.n_cores());
    let layout = topology.distribute(size, granularity)?;
    info!(
        shards = layout.len(),
        layout = %encode_layout(&layout),
        "spawning shard group"
    );

    let name = args.group.clone().unwrap_or_else(|| args.image.clone());
    let spec = GroupSpec {
        name,
        image: args.image,
        layout,
        ports,
        overlay,
    };

    let orchestrator = Orchestrator::new(DockerEngine::from_env()?);
    let group = orchestrator.exec(&spec).await?;

    if let Some(front) = frontend.as_mut() {
        front.create_service(&group.name, &group.shards).await?;
    }

    super::print_group(&group);
    Ok(())
}

fn encode_layout(layout: &[Unit]) -> String {
    layout
        .iter()
        .map(Unit::encode)
        .collect::<Vec<_>>()
        .join(", ")
}
