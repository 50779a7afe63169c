//! Day and bulk ingestion runs
//!
//! One day = two passes (created, updated). Every page is translated,
//! merged into Solr under the abstract-preserving rules, and each work that
//! arrived with a DOI but no abstract is queued for the fetch cascade.

use anyhow::Result;
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};

use lacuna_cache::CacheStore;
use lacuna_core::is_shutdown_requested;
use lacuna_core::model::QueueEntry;
use lacuna_core::Reference;
use lacuna_solr::{merge_daily_works, SolrClient, WorkDoc};

use crate::api::{DateFilter, OpenAlexApi};
use crate::transform::transform_work;
use crate::work::Work;

/// Counters from one ingest run.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub n_works: usize,
    pub n_queued: usize,
}

/// Pull and ingest all works created or updated on `date`.
pub fn ingest_day(
    api: &mut OpenAlexApi,
    store: &mut CacheStore,
    solr: &mut SolrClient,
    date: NaiveDate,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for kind in [DateFilter::Created, DateFilter::Updated] {
        let filter = kind.for_day(date);
        log::info!("ingesting works for filter {filter}");

        // Borrow pieces separately; the closure runs per cursor page
        let store_ref = &mut *store;
        let solr_ref = &mut *solr;
        let summary_ref = &mut summary;
        api.fetch_works(&filter, move |works| {
            ingest_page(store_ref, solr_ref, summary_ref, &works)
        })?;
    }

    log::info!(
        "ingested {} works for {date}, queued {} without abstract",
        summary.n_works,
        summary.n_queued
    );
    Ok(summary)
}

fn ingest_page(
    store: &mut CacheStore,
    solr: &mut SolrClient,
    summary: &mut IngestSummary,
    works: &[Work],
) -> Result<()> {
    summary.n_works += works.len();

    let mut docs: Vec<WorkDoc> = works
        .iter()
        .map(transform_work)
        .filter(|doc| !doc.id.is_empty())
        .collect();

    // Queue decision is based on the state OpenAlex delivered, before the
    // merge fills abstracts back in from Solr
    let entries: Vec<QueueEntry> = docs
        .iter()
        .filter(|doc| doc.doi.is_some() && doc.abstract_text.is_none())
        .map(|doc| {
            QueueEntry::new(Reference {
                openalex_id: Some(doc.id.clone()),
                doi: doc.doi.clone(),
                pubmed_id: doc.pmid.clone(),
                ..Default::default()
            })
        })
        .collect();

    merge_daily_works(solr, &mut docs)?;

    summary.n_queued += store.queue_requests(&entries)?;
    log::debug!(
        "page of {} works posted to solr, {} queued",
        works.len(),
        entries.len()
    );
    Ok(())
}

/// Ingest an inclusive day range, one day at a time.
pub fn ingest_bulk(
    api: &mut OpenAlexApi,
    store: &mut CacheStore,
    solr: &mut SolrClient,
    from_date: NaiveDate,
    to_date: NaiveDate,
) -> Result<IngestSummary> {
    anyhow::ensure!(from_date <= to_date, "from date must be before to date");
    let n_days = (to_date - from_date).num_days() + 1;

    let bar = ProgressBar::new(n_days as u64).with_style(
        ProgressStyle::with_template("{bar:30} {pos}/{len} days {msg}")
            .expect("valid progress template"),
    );

    let mut total = IngestSummary::default();
    let mut date = from_date;
    while date <= to_date {
        bar.set_message(date.format("%Y-%m-%d").to_string());
        let summary = ingest_day(api, store, solr, date)?;
        total.n_works += summary.n_works;
        total.n_queued += summary.n_queued;
        bar.inc(1);

        if is_shutdown_requested() {
            log::info!("shutdown requested, stopping bulk ingest after {date}");
            break;
        }
        date = date + chrono::Duration::days(1);
    }
    bar.finish();
    Ok(total)
}
