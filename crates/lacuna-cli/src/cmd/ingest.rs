//! `lacuna ingest` - daily OpenAlex delta pulls

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Subcommand};

use lacuna_cache::CacheStore;
use lacuna_ingest::{ingest_bulk, ingest_day, OpenAlexApi};
use lacuna_solr::SolrClient;

use crate::config::Config;

#[derive(Args)]
pub struct IngestArgs {
    #[command(subcommand)]
    command: IngestCommand,
}

#[derive(Subcommand)]
enum IngestCommand {
    /// Ingest works created or updated on one day
    Day {
        /// Day to pull (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },
    /// Ingest an inclusive day range
    Bulk {
        /// First day to pull
        #[arg(long)]
        from: NaiveDate,

        /// Last day to pull
        #[arg(long)]
        to: NaiveDate,
    },
}

pub fn run(args: IngestArgs, config: &Config) -> Result<()> {
    let mut store = CacheStore::open(&config.cache.db_path)?;
    let mut solr = SolrClient::new(&config.solr.base_url, &config.solr.collection);
    let mut api = OpenAlexApi::new(&config.openalex.api_url, config.openalex.api_key.as_deref());

    let summary = match args.command {
        IngestCommand::Day { date } => ingest_day(&mut api, &mut store, &mut solr, date)?,
        IngestCommand::Bulk { from, to } => {
            ingest_bulk(&mut api, &mut store, &mut solr, from, to)?
        }
    };

    log::info!(
        "ingested {} works, queued {} for abstract completion",
        summary.n_works,
        summary.n_queued
    );
    Ok(())
}
