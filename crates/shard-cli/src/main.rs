use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "shard",
    about = "shardgrid — topology-aware container sharding",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Load balancer endpoint, iface://host:port
    #[arg(long = "lb", global = true, env = "SHARD_LB_URI")]
    lb: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a sharded container group
    Run {
        /// Container image reference
        image: String,
        /// Group name (defaults to the image reference)
        #[arg(short, long)]
        group: Option<String>,
        /// Number of shards (defaults to the machine's core count)
        #[arg(short = 'n', long)]
        size: Option<usize>,
        /// Distribution granularity: core or node
        #[arg(long, default_value = "core")]
        granularity: String,
        /// Ports to publish, [host:]container[/proto]
        #[arg(short, long = "port")]
        ports: Vec<String>,
        /// Container config overlay (engine-native JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List all sharded container groups
    Ps,
    /// Stop a sharded container group
    Stop {
        /// Group name
        #[arg(short, long)]
        group: String,
        /// Remove stopped instances and their anonymous volumes
        #[arg(long)]
        purge: bool,
        /// Graceful stop window in seconds
        #[arg(long, default_value_t = 30)]
        stop_timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shard_cli=info".parse()?)
                .add_directive("shard_topology=info".parse()?)
                .add_directive("shard_runtime=info".parse()?)
                .add_directive("shard_frontend=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            image,
            group,
            size,
            granularity,
            ports,
            config,
        } => {
            commands::run::run(commands::run::RunArgs {
                image,
                group,
                size,
                granularity,
                ports,
                config,
                lb: cli.lb,
            })
            .await
        }
        Commands::Ps => commands::ps::ps().await,
        Commands::Stop {
            group,
            purge,
            stop_timeout,
        } => commands::stop::stop(&group, purge, stop_timeout, cli.lb.as_deref()).await,
    }
}
