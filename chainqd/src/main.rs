//! Chainq daemon

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chainqdlib::{config::load_config, indexer::Indexer};

#[derive(Parser, Debug)]
#[command(name = "chainqd", about = "Chain adapter and block fetch daemon", version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .init();

    let args = Args::parse();
    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from("./chainqd/chainqd.toml"));
    let config = load_config(&config_path);

    info!(
        ?config_path,
        family = %config.network.family,
        endpoint = %config.network.endpoint,
        start_height = config.start_height,
        end_height = ?config.end_height,
        "Fetching blocks from chain node.."
    );

    match Indexer::start(config).await {
        Ok(()) => info!("Block fetching finished, node connection closed."),
        Err(e) => {
            error!(error = ?e, "Block fetching aborted");
            std::process::exit(1);
        }
    }
}
