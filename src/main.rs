use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use mstransfer::client::discovery::resolve_inputs;
use mstransfer::client::progress::BatchProgress;
use mstransfer::client::{Endpoint, Sender};
use mstransfer::config::{ClientConfig, ServerConfig, StoreMode};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a receiver that stores incoming transfers
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for received files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Keep received data compressed (msz) or decompress it (mzml)
        #[arg(long, value_enum)]
        store_as: Option<StoreMode>,
    },

    /// Send files or directories to a receiver
    Upload {
        /// Files or directories to send
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,

        /// Receiver as host, host:port or URL
        target: String,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Maximum uploads in flight
        #[arg(short = 'p', long)]
        parallel: Option<usize>,

        /// Read/compress chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Disable progress bars
        #[arg(long)]
        no_progress: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mstransfer=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Serve {
            host,
            port,
            output_dir,
            store_as,
        } => {
            let mut config = ServerConfig::from_env();
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(output_dir) = output_dir {
                config.output_dir = output_dir;
            }
            if let Some(store_as) = store_as {
                config.store_as = store_as;
            }

            info!("🚀 Starting mstransfer receiver...");
            mstransfer::serve(config).await
        }
        Command::Upload {
            paths,
            target,
            recursive,
            parallel,
            chunk_size,
            no_progress,
        } => {
            let mut config = ClientConfig::from_env();
            if let Some(parallel) = parallel {
                config.parallelism = parallel;
            }
            if let Some(chunk_size) = chunk_size.filter(|size| *size > 0) {
                config.chunk_size = chunk_size;
            }

            upload(paths, &target, recursive, config, !no_progress).await
        }
    }
}

async fn upload(
    paths: Vec<PathBuf>,
    target: &str,
    recursive: bool,
    config: ClientConfig,
    show_progress: bool,
) -> anyhow::Result<()> {
    let inputs = resolve_inputs(&paths, recursive)?;
    let endpoint = Endpoint::parse(target)?;
    let mut sender = Sender::new(endpoint, config)?;
    if show_progress {
        sender = sender.with_progress(Arc::new(BatchProgress::new()));
    }

    let health = sender
        .check_health()
        .await
        .with_context(|| format!("receiver at {} is not reachable", sender.endpoint()))?;
    info!(
        "🔌 Connected to {} (version {}, storing as {})",
        sender.endpoint(),
        health.version,
        health.store_as
    );
    info!("📦 Sending {} file(s)", inputs.len());

    let parallelism = sender.config().parallelism;
    let outcomes = sender.send_batch(inputs, parallelism).await;
    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();

    info!(
        "Done: {} succeeded, {} failed",
        outcomes.len() - failed.len(),
        failed.len()
    );
    for outcome in &failed {
        if let Err(e) = &outcome.result {
            error!("  {}: {}", outcome.input, e);
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("{} of {} transfers failed", failed.len(), outcomes.len());
    }
    Ok(())
}
