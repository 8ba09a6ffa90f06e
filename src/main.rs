use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use csv_data_service::config::Config;
use csv_data_service::server::{self, AppState};
use csv_data_service::storage::{FsStorage, Storage};
use csv_data_service::{logging, metrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "csv_data_service")]
#[command(about = "Serve CSV datasets as JSON and fill missing neighborhoods by postal code")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the CSV datasets
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Fill missing neighborhoods in the primary dataset once and exit
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = cli.data_dir {
        config.data.dir = dir;
    }
    if let Commands::Serve { port: Some(port) } = cli.command {
        config.server.port = port;
    }

    let _guard = logging::init_logging(&config.logging.dir, &config.logging.file_prefix);
    if let Some(addr) = config.metrics_addr() {
        metrics::init_metrics(addr);
    }

    let storage: Arc<dyn Storage> = Arc::new(FsStorage::new(config.data_dir()));
    let state = AppState::new(
        storage,
        config.primary_dataset()?,
        config.mapping_dataset()?,
    );
    info!(data_dir = %config.data.dir.display(), "using data directory");

    match cli.command {
        Commands::Serve { .. } => {
            let addr = config.bind_addr()?;
            server::start_server(state, config.allowed_origins()?, addr).await?;
        }
        Commands::Reconcile => match state.reconciler.run().await {
            Ok(summary) => {
                println!("{}", server::MAPPING_COMPLETE);
                println!("   Rows:      {}", summary.rows_total);
                println!("   Missing:   {}", summary.rows_missing);
                println!("   Filled:    {}", summary.rows_filled);
                println!("   Unmatched: {}", summary.rows_unmatched);
            }
            Err(e) => {
                error!("Reconciliation failed: {}", e);
                return Err(e.into());
            }
        },
    }

    Ok(())
}
