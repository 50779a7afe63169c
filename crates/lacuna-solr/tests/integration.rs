//! Integration tests against a local Solr collection
//!
//! Require a running Solr with the works collection; ignored by default.
//! Configure via SOLR_BASE_URL (default http://localhost:8983) and
//! SOLR_COLLECTION (default openalex).
//!
//! Run with: cargo test -p lacuna-solr --test integration -- --ignored

use chrono::Utc;

use lacuna_cache::CacheStore;
use lacuna_solr::{seed_queue, transfer_abstracts, SolrClient};

fn solr() -> SolrClient {
    let base_url =
        std::env::var("SOLR_BASE_URL").unwrap_or_else(|_| "http://localhost:8983".to_string());
    let collection = std::env::var("SOLR_COLLECTION").unwrap_or_else(|_| "openalex".to_string());
    SolrClient::new(&base_url, &collection)
}

/// Gap detection over the last week seeds the queue without duplicates on a
/// second run.
#[test]
#[ignore]
fn seed_queue_is_idempotent() {
    let mut store = CacheStore::open_in_memory().unwrap();
    let mut client = solr();
    let today = Utc::now().date_naive();
    let week_ago = today - chrono::Duration::days(7);

    let first = seed_queue(&mut store, &mut client, week_ago, today, 100, 50).unwrap();
    let second = seed_queue(&mut store, &mut client, week_ago, today, 100, 50).unwrap();

    assert_eq!(second.n_queued, 0, "second run must not re-queue");
    assert_eq!(
        store.queue_stats().unwrap().queue_total as usize,
        first.n_queued
    );
}

/// Transfer with an empty cache is a no-op against the index.
#[test]
#[ignore]
fn transfer_with_empty_cache() {
    let store = CacheStore::open_in_memory().unwrap();
    let mut client = solr();
    let summary = transfer_abstracts(&store, &mut client, 200, false, None).unwrap();
    assert_eq!(summary.n_records, 0);
    assert_eq!(summary.n_written, 0);
}
