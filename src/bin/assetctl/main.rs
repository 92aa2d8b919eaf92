//! Read-side client for a deployed confidential asset registry.
//!
//! Projects the registry into a local cache and prints it. Creation and
//! verification need a homomorphic-encryption runtime and are driven through
//! the library's `AssetCoordinator`; see the `demo` binary.
//!
//! Run with:
//!   cargo run --bin assetctl -- --config assets.toml list

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

mod config;

use confidential_assets::adapters::ethereum::EthereumLedger;
use confidential_assets::cache::{project, RecordCache, ReloadReport};
use confidential_assets::domain::record::{Record, RecordId};
use confidential_assets::domain::session::Session;
use confidential_assets::ports::ledger::{LedgerError, LedgerPort};
use config::Config;

#[derive(Parser)]
#[command(name = "assetctl", about = "Inspect confidential asset records on-chain")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "./assets.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all records
    List {
        /// Only records created by the session account
        #[arg(long)]
        mine: bool,
    },
    /// Show one record
    Show { id: String },
    /// Print aggregate counters
    Stats,
    /// Case-insensitive search on name or category
    Search { term: String },
    /// Check that the registry answers
    Probe,
    /// Reload on an interval and print counters until interrupted
    Watch,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("no session account configured (set session.account or ledger.private_key)")]
    NotConnected,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::load(&cli.config)?;
    let session = config.account().map_or_else(Session::disconnected, Session::connected);

    let ledger = match &config.ledger.private_key {
        Some(key) => EthereumLedger::with_signer(
            &config.ledger.rpc_url,
            key,
            config.ledger.registry_address,
        )?,
        None => EthereumLedger::read_only(&config.ledger.rpc_url, config.ledger.registry_address)?,
    };
    info!(registry = %config.ledger.registry_address, connected = session.is_connected(), "registry client ready");

    let cache = RecordCache::new();

    match cli.command {
        Command::List { mine } => {
            reload(&ledger, &cache).await?;
            let owner = if mine {
                Some(session.account().ok_or(CliError::NotConnected)?)
            } else {
                None
            };
            let snapshot = cache.snapshot();
            for record in snapshot.records() {
                if owner.map_or(true, |o| record.creator == o) {
                    println!("{}", summary_line(record));
                }
            }
        }
        Command::Show { id } => {
            reload(&ledger, &cache).await?;
            let id = RecordId::new(id);
            let record = cache.get(&id).ok_or(CliError::NotFound(id))?;
            print_record(&record);
        }
        Command::Stats => {
            let report = reload(&ledger, &cache).await?;
            print_stats(&report);
        }
        Command::Search { term } => {
            reload(&ledger, &cache).await?;
            for record in cache.search(&term) {
                println!("{}", summary_line(&record));
            }
        }
        Command::Probe => {
            let available = ledger.probe_availability().await?;
            println!("System available: {available}");
        }
        Command::Watch => {
            let mut ticker = tokio::time::interval(config.watch.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => match reload(&ledger, &cache).await {
                        Ok(report) => print_stats(&report),
                        Err(e) => warn!("reload failed: {e}"),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutting down");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Full reload into `cache`. The CLI never tracks in-flight verifications.
async fn reload(ledger: &EthereumLedger, cache: &RecordCache) -> Result<ReloadReport, LedgerError> {
    let epoch = cache.begin_reload();
    let (records, failures) = project(ledger, &HashMap::new()).await?;
    let installed = cache.replace(epoch, records);
    Ok(ReloadReport {
        stats: installed.unwrap_or_else(|| cache.stats()),
        failures,
        installed: installed.is_some(),
    })
}

fn summary_line(record: &Record) -> String {
    format!(
        "{:<22} {:<24} {:<12} {:<11} {}",
        record.id.as_str(),
        record.name,
        record.category.label(),
        record.status_label(),
        record.verification.to_string(),
    )
}

fn print_record(record: &Record) {
    println!("id:          {}", record.id);
    println!("name:        {}", record.name);
    println!("category:    {}", record.category);
    println!("status:      {} ({})", record.status_label(), record.status_code);
    println!("creator:     {}", record.creator);
    println!("created at:  {}", record.created_at);
    println!("ciphertext:  {}", record.ciphertext_handle);
    println!("state:       {}", record.verification);
    match record.clear_value() {
        Some(value) => println!("value:       {value}"),
        None => println!("value:       (encrypted)"),
    }
}

fn print_stats(report: &ReloadReport) {
    println!(
        "total: {}  verified: {}  active: {}",
        report.stats.total, report.stats.verified, report.stats.active
    );
    for failure in &report.failures {
        println!("  skipped {}: {}", failure.id, failure.error);
    }
}
