//! Partition server binary

use anyhow::Result;
use clap::{Parser, Subcommand};
use minidoc::PartitionServer;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minidoc-partition")]
#[command(about = "minidoc data partition (schema state only)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve one partition rank
    Serve {
        /// Partition rank
        #[arg(long)]
        rank: usize,

        /// Directory holding the partition sockets
        #[arg(long, default_value = "./minidoc-run")]
        work_dir: PathBuf,

        /// Directory for the partition's schema (in memory if omitted)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            rank,
            work_dir,
            data_dir,
            log_level,
        } => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| log_level.into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let server = PartitionServer::bind(rank, &work_dir, data_dir.as_deref())?;
            tokio::select! {
                res = server.serve() => res?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, stopping partition {}", rank);
                }
            }
        }
    }

    Ok(())
}
