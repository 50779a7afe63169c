//! `lacuna worker` - one drainer invocation

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use lacuna_cache::CacheStore;
use lacuna_core::model::SourceTag;
use lacuna_worker::{live_fetcher, WorkerConfig};

use crate::config::Config;

#[derive(Args)]
pub struct WorkerArgs {
    /// Seconds for this invocation to run before stopping
    #[arg(long)]
    max_runtime: Option<u64>,

    /// Sources to include, in loop order (default: DIMENSIONS SCOPUS PUBMED WOS)
    #[arg(long, num_args = 1..)]
    sources: Vec<String>,

    /// Queue entries per source per loop
    #[arg(long)]
    batch_size: Option<usize>,

    /// Minimum length before something is accepted as an abstract
    #[arg(long)]
    min_abstract_len: Option<usize>,
}

pub fn run(args: WorkerArgs, config: &Config) -> Result<()> {
    let Some(auth_key) = config.cache.auth_key.clone() else {
        bail!("no auth key configured (cache.auth_key or LACUNA_AUTH_KEY)");
    };

    let sources = if args.sources.is_empty() {
        WorkerConfig::default().sources
    } else {
        args.sources
            .iter()
            .map(|name| {
                SourceTag::from_name(name).with_context(|| format!("unknown source: {name}"))
            })
            .collect::<Result<Vec<_>>>()?
    };

    let worker_config = WorkerConfig {
        sources,
        batch_size: args.batch_size.unwrap_or(config.worker.batch_size),
        min_abstract_len: args.min_abstract_len.unwrap_or(config.worker.min_abstract_len),
        max_runtime: Duration::from_secs(args.max_runtime.unwrap_or(config.worker.max_runtime)),
        auth_key,
    };

    let mut store = CacheStore::open(&config.cache.db_path)?;
    let mut fetch = live_fetcher();
    let summary = lacuna_worker::run(&mut store, &worker_config, &mut fetch)?;

    log::info!(
        "finished after {} loops with {} queue entries processed",
        summary.n_loops,
        summary.n_processed
    );
    Ok(())
}
