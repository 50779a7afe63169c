//! `lacuna status` - queue backlog and cache counters

use anyhow::Result;
use clap::Args;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};

use lacuna_cache::CacheStore;

use crate::config::Config;

#[derive(Args)]
pub struct StatusArgs {}

pub fn run(_args: StatusArgs, config: &Config) -> Result<()> {
    let store = CacheStore::open(&config.cache.db_path)?;
    let stats = store.queue_stats()?;

    let mut queue_table = Table::new();
    queue_table.load_preset(UTF8_FULL_CONDENSED);
    queue_table.set_header(["Head source", "Pending"]);
    for (source, count) in &stats.queued_by_source {
        queue_table.add_row([source.clone(), count.to_string()]);
    }
    queue_table.add_row(["total".to_string(), stats.queue_total.to_string()]);

    let mut cache_table = Table::new();
    cache_table.load_preset(UTF8_FULL_CONDENSED);
    cache_table.set_header(["Requests", "Count"]);
    cache_table.add_row(["stored".to_string(), stats.request_total.to_string()]);
    cache_table.add_row([
        "with abstract".to_string(),
        stats.request_with_abstract.to_string(),
    ]);
    cache_table.add_row([
        "awaiting transfer".to_string(),
        stats.request_unsolarized.to_string(),
    ]);

    println!("Queue backlog:");
    println!("{queue_table}");
    println!();
    println!("Meta-cache:");
    println!("{cache_table}");
    Ok(())
}
