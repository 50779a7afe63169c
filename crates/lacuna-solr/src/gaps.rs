//! Gap detection: works without abstracts
//!
//! Enumerates `(openalex_id, doi, pubmed_id)` tuples for works missing an
//! abstract in a created/updated time window and seeds the fetch queue.
//! Dedup against existing queue entries and completed requests matches on
//! `openalex_id` only: a prior DOI-only entry may still benefit from the
//! OpenAlex linkage.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use rustc_hash::FxHashSet;

use lacuna_cache::CacheStore;
use lacuna_core::model::{OnConflict, QueueEntry};
use lacuna_core::Reference;

use crate::client::SolrClient;

/// Failsafe so a typo cannot queue millions.
pub const HARD_LIMIT: usize = 100_000;

/// One gap found in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingWork {
    pub openalex_id: String,
    pub doi: Option<String>,
    pub pubmed_id: Option<String>,
}

/// Outcome of one seeding run.
#[derive(Debug, Default)]
pub struct SeedSummary {
    pub n_found: usize,
    pub n_known: usize,
    pub n_queued: usize,
}

/// Works with no abstract whose `created_date` or `updated_date` falls in
/// the window, capped at `limit`.
pub fn missing_abstracts_in_window(
    solr: &mut SolrClient,
    created_since: NaiveDate,
    created_until: NaiveDate,
    limit: usize,
) -> Result<Vec<MissingWork>> {
    let since = format!("{}T00:00:00Z", created_since.format("%Y-%m-%d"));
    let until = format!("{}T23:59:59Z", created_until.format("%Y-%m-%d"));
    let query = format!(
        "-abstract:* AND (created_date:[{since} TO {until}] OR updated_date:[{since} TO {until}])"
    );
    let rows = limit.to_string();
    let docs = solr.select_docs(&query, &[("fl", "id,doi,id_pmid"), ("rows", rows.as_str())])?;
    log::info!(
        "found {} works with missing abstract between {created_since} and {created_until}",
        docs.len()
    );

    Ok(docs
        .iter()
        .filter_map(|doc| {
            Some(MissingWork {
                openalex_id: doc["id"].as_str()?.to_string(),
                doi: doc["doi"].as_str().map(String::from),
                pubmed_id: doc["id_pmid"].as_str().map(String::from),
            })
        })
        .collect())
}

/// Of the given IDs, the subset that still lacks an abstract in Solr.
pub fn missing_abstracts_for_ids(
    solr: &mut SolrClient,
    openalex_ids: &[String],
) -> Result<FxHashSet<String>> {
    if openalex_ids.is_empty() {
        return Ok(FxHashSet::default());
    }
    let fq = format!("id:({})", openalex_ids.join(" OR "));
    let rows = openalex_ids.len().to_string();
    let docs = solr.select_docs(
        "-abstract:*",
        &[("fq", fq.as_str()), ("fl", "id"), ("rows", rows.as_str())],
    )?;
    Ok(docs
        .iter()
        .filter_map(|doc| doc["id"].as_str().map(String::from))
        .collect())
}

/// Find gaps in the window and queue the unknown ones with the default
/// source list (assigned later by `update_default_sources`).
pub fn seed_queue(
    store: &mut CacheStore,
    solr: &mut SolrClient,
    created_since: NaiveDate,
    created_until: NaiveDate,
    limit: usize,
    batch_size: usize,
) -> Result<SeedSummary> {
    if limit > HARD_LIMIT {
        bail!("limit must be <= {HARD_LIMIT}, but got {limit}");
    }

    let works = missing_abstracts_in_window(solr, created_since, created_until, limit)?;
    let mut summary = SeedSummary {
        n_found: works.len(),
        ..Default::default()
    };

    for batch in works.chunks(batch_size.max(1)) {
        let ids: Vec<String> = batch.iter().map(|w| w.openalex_id.clone()).collect();
        let known = store.known_openalex_ids(&ids)?;
        summary.n_known += known.len();

        let entries: Vec<QueueEntry> = batch
            .iter()
            .filter(|work| !known.contains(&work.openalex_id))
            .map(|work| {
                let mut entry = QueueEntry::new(Reference {
                    openalex_id: Some(work.openalex_id.clone()),
                    doi: work.doi.clone(),
                    pubmed_id: work.pubmed_id.clone(),
                    ..Default::default()
                });
                entry.on_conflict = OnConflict::DoNothing;
                entry
            })
            .collect();
        summary.n_queued += store.queue_requests(&entries)?;
    }

    log::info!(
        "queued {} of {} works with missing abstracts ({} already known)",
        summary.n_queued,
        summary.n_found,
        summary.n_known
    );
    Ok(summary)
}
