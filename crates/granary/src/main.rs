//! Granary CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use granary::{run_discovery, run_reingest, run_retraction, DiscoveryConfig, OutputRecord};
use granary_logging::{init_logging, LogConfig};
use granary_store::GranuleStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "granary", version, about = "Granule discovery pipeline")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "granary.toml")]
    config: PathBuf,

    /// Verbose console logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover new or changed granules at the provider
    Discover {
        /// Print output records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Retract a previously emitted batch from the store
    Retract {
        /// JSON file holding the rejected output records
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Regenerate output records for known keys without discovery
    Reingest {
        /// Granule keys to re-emit
        #[arg(required = true)]
        keys: Vec<String>,

        /// Print output records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show store statistics for the configured collection
    Status {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(LogConfig {
        app_name: "granary",
        verbose: cli.verbose,
    });

    let config = DiscoveryConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Discover { json } => {
            let store = GranuleStore::open(config.resolve_store_path()).await?;
            let records = run_discovery(&config, &store).await?;
            store.close().await;
            print_records(&records, json)?;
        }
        Commands::Retract { input } => {
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let records: Vec<OutputRecord> =
                serde_json::from_str(&content).context("Invalid output record file")?;

            let store = GranuleStore::open(config.resolve_store_path()).await?;
            let removed = run_retraction(&config, &store, &records).await?;
            store.close().await;
            println!("Removed {removed} record(s)");
        }
        Commands::Reingest { keys, json } => {
            let records = run_reingest(&config, &keys)?;
            print_records(&records, json)?;
        }
        Commands::Status { json } => {
            let store_path = config.resolve_store_path();
            let store = GranuleStore::open(&store_path).await?;
            let count = store.count().await?;
            store.close().await;

            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "storePath": &store_path,
                        "collection": &config.collection.name,
                        "granules": count,
                    })
                );
            } else {
                println!("Store:      {}", store_path.display());
                println!("Collection: {}", config.collection.name);
                println!("Granules:   {count}");
            }
        }
    }

    Ok(())
}

fn print_records(records: &[OutputRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
    } else {
        for record in records {
            println!("{}", record.granule_id);
        }
        println!("{} granule(s)", records.len());
    }
    Ok(())
}
