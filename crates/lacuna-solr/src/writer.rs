//! Abstract write-back into Solr
//!
//! Two merge rules protect existing data:
//!
//! * cache → Solr transfer only touches works that still lack an abstract
//!   (unless forced), via atomic `{"set": ...}` partial updates stamped with
//!   provenance;
//! * daily OpenAlex ingestion keeps an abstract that OpenAlex has since
//!   dropped, retagging its source as `OpenAlex_old`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde_json::{json, Value};

use lacuna_cache::CacheStore;
use lacuna_core::model::Request;

use crate::client::SolrClient;
use crate::doc::WorkDoc;
use crate::gaps::missing_abstracts_for_ids;

/// Outcome of one transfer run.
#[derive(Debug, Default)]
pub struct TransferSummary {
    pub n_records: usize,
    pub n_written: usize,
    pub n_skipped: usize,
}

fn timestamp_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Move complete cached requests into Solr.
///
/// Without `from_time`, drains everything not yet solarized; with it, walks
/// all complete records created after the cutoff. Either way the affected
/// works are marked solarized by `openalex_id` afterwards.
pub fn transfer_abstracts(
    store: &CacheStore,
    solr: &mut SolrClient,
    batch_size: usize,
    force: bool,
    from_time: Option<DateTime<Utc>>,
) -> Result<TransferSummary> {
    let mut summary = TransferSummary::default();
    let batch_size = batch_size.max(1);
    let mut offset = 0usize;

    loop {
        let batch = match from_time {
            Some(t) => store.read_complete_records(Some(t), batch_size, offset)?,
            None => store.read_unsolarized_complete(batch_size)?,
        };
        if batch.is_empty() {
            break;
        }
        summary.n_records += batch.len();

        let (n_written, n_skipped) = write_cache_records(solr, &batch, force)?;
        summary.n_written += n_written;
        summary.n_skipped += n_skipped;

        let ids: Vec<String> = batch
            .iter()
            .filter_map(|r| r.reference.openalex_id.clone())
            .collect();
        store.mark_solarized(&ids)?;

        if from_time.is_some() {
            // This result set is not shrunk by the solarized flag
            offset += batch.len();
        }
    }

    log::info!(
        "transfer finished: {} written, {} skipped of {} records",
        summary.n_written,
        summary.n_skipped,
        summary.n_records
    );
    Ok(summary)
}

/// Write one batch of cached requests as partial updates. Works that still
/// have an abstract in Solr are skipped unless `force` is set.
fn write_cache_records(
    solr: &mut SolrClient,
    records: &[Request],
    force: bool,
) -> Result<(usize, usize)> {
    let ids: Vec<String> = records
        .iter()
        .filter_map(|r| r.reference.openalex_id.clone())
        .collect();

    let needs_update = if force {
        None
    } else {
        let missing = missing_abstracts_for_ids(solr, &ids)?;
        log::debug!(
            "batch of {} records has {} missing abstracts in solr",
            records.len(),
            missing.len()
        );
        Some(missing)
    };

    let docs = partial_update_docs(records, needs_update.as_ref(), &timestamp_now());
    let n_written = docs.len();
    solr.update(&docs)?;
    Ok((n_written, records.len() - n_written))
}

/// Atomic `{"set": ...}` update documents for the records selected by the
/// gap filter.
fn partial_update_docs(
    records: &[Request],
    needs_update: Option<&FxHashSet<String>>,
    timestamp: &str,
) -> Vec<Value> {
    records
        .iter()
        .filter_map(|record| {
            let openalex_id = record.reference.openalex_id.as_deref()?;
            if let Some(needed) = needs_update {
                if !needed.contains(openalex_id) {
                    return None;
                }
            }
            let title = record.title.as_deref().unwrap_or("");
            let abstract_text = record.abstract_text.as_deref().unwrap_or("");
            Some(json!({
                "id": openalex_id,
                "title": {"set": record.title},
                "abstract": {"set": record.abstract_text},
                "title_abstract": {"set": format!("{title} {abstract_text}")},
                "abstract_source": {"set": record.wrapper.as_str()},
                "abstract_date": {"set": timestamp},
            }))
        })
        .collect()
}

/// Post new/updated works from the daily ingest, preserving abstracts that
/// the incoming OpenAlex records lost.
pub fn merge_daily_works(solr: &mut SolrClient, docs: &mut [WorkDoc]) -> Result<()> {
    if docs.is_empty() {
        return Ok(());
    }

    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    let fq = format!("id:({})", ids.join(" OR "));
    let rows = docs.len().to_string();
    let existing = solr.select_docs(
        "abstract:*",
        &[("fq", fq.as_str()), ("fl", "id,abstract,abstract_source"), ("rows", rows.as_str())],
    )?;
    log::debug!(
        "checked {} works, {} already carry an abstract in solr",
        docs.len(),
        existing.len()
    );

    let existing_by_id: std::collections::HashMap<&str, &Value> = existing
        .iter()
        .filter_map(|doc| doc["id"].as_str().map(|id| (id, doc)))
        .collect();

    let timestamp = timestamp_now();
    for doc in docs.iter_mut() {
        match existing_by_id.get(doc.id.as_str()) {
            Some(existing_doc) => apply_merge_rule(
                doc,
                existing_doc["abstract"].as_str(),
                existing_doc["abstract_source"].as_str(),
                &timestamp,
            ),
            // No abstract in Solr yet: an incoming abstract is new
            None => {
                if doc.abstract_text.is_some() {
                    doc.abstract_date = Some(timestamp.clone());
                }
            }
        }
    }

    let values: Vec<Value> = docs.iter().map(WorkDoc::to_value).collect();
    solr.update(&values)
}

/// The OpenAlex-regression rule for one work already carrying an abstract.
fn apply_merge_rule(
    doc: &mut WorkDoc,
    existing_abstract: Option<&str>,
    existing_source: Option<&str>,
    timestamp: &str,
) {
    let incoming_abstract = doc.abstract_text.clone();

    if incoming_abstract.is_none() && existing_abstract.is_some() {
        // Keep the externally-obtained abstract against the regression
        doc.abstract_text = existing_abstract.map(String::from);
        doc.refresh_title_abstract();
        doc.abstract_source = match existing_source {
            Some("OpenAlex") => Some("OpenAlex_old".to_string()),
            Some(other) => Some(other.to_string()),
            None => Some("OpenAlex_old".to_string()),
        };
    }

    if incoming_abstract.as_deref() != existing_abstract {
        doc.abstract_date = Some(timestamp.to_string());
    }
}
