//! `lacuna abstracts` - gap detection and Solr write-back

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};

use lacuna_cache::CacheStore;
use lacuna_solr::{seed_queue, transfer_abstracts, SolrClient};

use crate::config::Config;

#[derive(Args)]
pub struct AbstractsArgs {
    #[command(subcommand)]
    command: AbstractsCommand,
}

#[derive(Subcommand)]
enum AbstractsCommand {
    /// Check Solr for works with missing abstracts and queue them
    Queue {
        /// Works created/updated on or after this day (YYYY-MM-DD)
        #[arg(long)]
        created_since: NaiveDate,

        /// Works created/updated until this day (default: today)
        #[arg(long)]
        created_until: Option<NaiveDate>,

        /// Failsafe so we do not accidentally queue millions
        #[arg(long, default_value_t = 1000)]
        limit: usize,

        #[arg(long, default_value_t = 200)]
        batch_size: usize,
    },
    /// Write abstracts from the cache to Solr
    Transfer {
        #[arg(long, default_value_t = 200)]
        batch_size: usize,

        /// Overwrite abstracts that already exist in Solr
        #[arg(long)]
        force: bool,

        /// Walk all complete records created since this day instead of the
        /// not-yet-transferred backlog
        #[arg(long)]
        created_since: Option<NaiveDate>,
    },
}

pub fn run(args: AbstractsArgs, config: &Config) -> Result<()> {
    let mut store = CacheStore::open(&config.cache.db_path)?;
    let mut solr = SolrClient::new(&config.solr.base_url, &config.solr.collection);

    match args.command {
        AbstractsCommand::Queue {
            created_since,
            created_until,
            limit,
            batch_size,
        } => {
            let until = created_until.unwrap_or_else(|| Utc::now().date_naive());
            let summary = seed_queue(
                &mut store,
                &mut solr,
                created_since,
                until,
                limit,
                batch_size,
            )?;
            log::info!(
                "queued {} new entries ({} gaps found, {} already known)",
                summary.n_queued,
                summary.n_found,
                summary.n_known
            );
        }
        AbstractsCommand::Transfer {
            batch_size,
            force,
            created_since,
        } => {
            let from_time = created_since
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|t| t.and_utc());
            let summary = transfer_abstracts(&store, &mut solr, batch_size, force, from_time)?;
            log::info!(
                "transferred {} of {} records ({} skipped, already complete in solr)",
                summary.n_written,
                summary.n_records,
                summary.n_skipped
            );
        }
    }
    Ok(())
}
