//! Coordinator CLI

use clap::{Parser, Subcommand};
use minidoc::common::{format_ranks, retry_with_backoff, Config};
use minidoc::Coordinator;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minidoc-coord")]
#[command(about = "minidoc partition coordinator")]
#[command(version)]
struct Cli {
    /// Config file (default: ./minidoc.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of partitions
    #[arg(long)]
    ranks: Option<usize>,

    /// Directory holding the partition sockets
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Directory holding the schema catalog
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Per-call timeout in milliseconds (0 waits forever)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Connection attempts while partitions are still starting
    #[arg(long, default_value = "1")]
    connect_attempts: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, reconcile the schema and print it
    Status,

    /// Freeze the cluster, drop caches and reload the schema
    Sync,

    /// Shut down every partition
    Shutdown,

    /// Create a collection on every partition
    CreateCollection {
        /// Collection name
        name: String,
    },

    /// Create an index on every partition
    CreateIndex {
        /// Collection name
        collection: String,

        /// Dotted index path, e.g. address.city
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config from file, then override with CLI arguments. An unreadable
    // default config is reported once logging is up.
    let (config, ignored) = match &cli.config {
        Some(path) => (Config::load_from(Some(path.as_path()))?, None),
        None => Config::load_or_default(None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(e) = ignored {
        tracing::warn!("Ignoring unreadable configuration: {}", e);
    }

    let mut coord_config = config.coordinator;
    if let Some(ranks) = cli.ranks {
        coord_config.total_rank = ranks;
    }
    if let Some(work_dir) = cli.work_dir {
        coord_config.work_dir = work_dir;
    }
    if let Some(data_dir) = cli.data_dir {
        coord_config.data_dir = data_dir;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        coord_config.call_timeout_ms = timeout_ms;
    }

    let coord = retry_with_backoff(
        || Coordinator::connect(coord_config.clone()),
        cli.connect_attempts,
        Duration::from_millis(200),
    )
    .await?;

    let diverged = coord.diverged_ranks().await;
    if !diverged.is_empty() {
        tracing::warn!(
            "Partitions {} lack part of the schema; run `sync` to repair",
            format_ranks(&diverged)
        );
    }

    match cli.command {
        Commands::Status => {}
        Commands::Sync => {
            let reconciled = coord.sync().await?;
            println!("synced, schema version {}", reconciled.version);
        }
        Commands::Shutdown => {
            coord.shutdown().await?;
            println!("all {} partitions shut down", coord.total_rank());
            return Ok(());
        }
        Commands::CreateCollection { name } => {
            if !coord.create_collection(&name).await? {
                println!("collection {} already exists", name);
            }
        }
        Commands::CreateIndex { collection, path } => {
            if !coord.create_index(&collection, &path).await? {
                println!("index {} on {} already exists", path, collection);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&coord.schema().await)?);
    Ok(())
}
