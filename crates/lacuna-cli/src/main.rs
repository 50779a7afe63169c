//! lacuna - abstract-completion pipeline for an OpenAlex search index
//!
//! Finds works without abstracts in Solr, drains the fetch queue through a
//! cascade of bibliographic APIs into the meta-cache, and writes recovered
//! abstracts back with provenance.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "lacuna")]
#[command(about = "Abstract-completion pipeline for an OpenAlex search index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (default: ./lacuna.toml or ~/.config/lacuna/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one drainer invocation over the fetch queue
    Worker(cmd::worker::WorkerArgs),
    /// Queue gaps and transfer recovered abstracts to Solr
    Abstracts(cmd::abstracts::AbstractsArgs),
    /// Pull daily OpenAlex deltas into Solr and the queue
    Ingest(cmd::ingest::IngestArgs),
    /// Show queue backlog and cache counters
    Status(cmd::status::StatusArgs),
    /// Manage API and auth keys
    Keys(cmd::keys::KeysArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    lacuna_core::register_signal_handlers();

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Worker(args) => cmd::worker::run(args, &config),
        Command::Abstracts(args) => cmd::abstracts::run(args, &config),
        Command::Ingest(args) => cmd::ingest::run(args, &config),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Keys(args) => cmd::keys::run(args, &config),
        Command::Config => {
            println!("Configuration:");
            println!("  Cache DB: {}", config.cache.db_path.display());
            println!(
                "  Auth key: {}",
                if config.cache.auth_key.is_some() {
                    "configured"
                } else {
                    "not set"
                }
            );
            println!();
            println!("Solr:");
            println!("  Base URL: {}", config.solr.base_url);
            println!("  Collection: {}", config.solr.collection);
            println!();
            println!("OpenAlex:");
            println!("  API URL: {}", config.openalex.api_url);
            println!(
                "  API key: {}",
                if config.openalex.api_key.is_some() {
                    "configured"
                } else {
                    "not set"
                }
            );
            println!();
            println!("Worker:");
            println!("  Batch size: {}", config.worker.batch_size);
            println!("  Min abstract length: {}", config.worker.min_abstract_len);
            println!("  Max runtime: {}s", config.worker.max_runtime);
            Ok(())
        }
    }
}
