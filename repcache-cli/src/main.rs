use clap::{Parser, Subcommand};
use repcache::{
    ConnectionSelector, JsonCodec, MemcacheConnector, RepcacheConfig, RetentionData,
    RetentionIdentities, RetentionSynchronizer, ServerPool,
};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "repcache", about = "Inspect and seed scheduler retention in memcached")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Comma-separated server pool, highest priority first
    #[arg(long, env = "REPCACHE_SERVERS", global = true)]
    servers: Option<String>,
    /// Directory holding repcache.json
    #[arg(long, env = "REPCACHE_CONFIG_DIR", default_value = ".", global = true)]
    config_dir: PathBuf,
    /// Stop at the first failing object instead of skipping it
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Report which server in the pool would serve the next pass
    Probe,
    /// Save a retention data set read from a JSON file
    Save {
        #[arg(long)]
        input: PathBuf,
    },
    /// Load retention for the identities listed in a JSON file and print it
    Load {
        #[arg(long)]
        input: PathBuf,
    },
}

type Synchronizer = RetentionSynchronizer<MemcacheConnector, JsonCodec<Value>>;

fn build_config(cli: &Cli) -> Result<RepcacheConfig, Box<dyn std::error::Error>> {
    let mut config = RepcacheConfig::load_or_default(&cli.config_dir);
    if let Some(servers) = &cli.servers {
        config.servers = repcache::config::parse_server_list(servers);
    }
    if cli.strict {
        config.continue_on_item_error = false;
    }
    config.validate()?;
    Ok(config)
}

fn build_synchronizer(config: &RepcacheConfig) -> Synchronizer {
    let selector = ConnectionSelector::new(
        MemcacheConnector::from_config(config),
        ServerPool::from_config(config),
    );
    RetentionSynchronizer::new(selector, JsonCodec::new())
        .with_continue_on_item_error(config.continue_on_item_error)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&cli)?;
    let sync = build_synchronizer(&config);

    match cli.command {
        Command::Probe => {
            let handle = sync.selector().acquire()?;
            println!("{}", handle.address());
            handle.release();
        }
        Command::Save { input } => {
            let raw = std::fs::read_to_string(&input)?;
            let data: RetentionData<Value> = serde_json::from_str(&raw)?;
            let report = sync.save(&data)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Load { input } => {
            let raw = std::fs::read_to_string(&input)?;
            let ids: RetentionIdentities = serde_json::from_str(&raw)?;
            let report = sync.load(&ids.hosts, &ids.services)?;
            tracing::info!(
                loaded = report.stats.loaded,
                absent = report.stats.absent,
                failed = report.stats.pass.failed(),
                "Load pass finished"
            );
            println!("{}", serde_json::to_string_pretty(&report.data)?);
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}
