//! The drainer loop
//!
//! Each queue entry's `sources` list is processed strictly head-first. One
//! pass over a `(source, batch)` pair either advances an entry (source
//! fetched, or skipped by policy, or permanently unavailable) or leaves it
//! untouched (transient failure, retried on the next pass). Entries whose
//! abstract was found keep only their FORCE sources; empty lists are
//! deleted. Progress and termination follow from the head-of-list rule.
//!
//! Failure severity is two-tiered: adapter and HTTP errors are batch-local
//! and never end the run, while meta-cache failures are fatal — without the
//! store no progress or bookkeeping is possible, so the loop aborts and the
//! process exits non-zero.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;

use lacuna_cache::{complete_ids, CacheStore, QueuedRequested};
use lacuna_core::model::{ApiKey, OnConflict, SourcePriority, SourceTag};
use lacuna_core::{is_shutdown_requested, FetchError, Reference};
use lacuna_sources::{FetchOutcome, Source};

/// One drainer invocation's parameters.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sources in loop order
    pub sources: Vec<SourceTag>,
    /// Queue entries per source per loop
    pub batch_size: usize,
    /// Abstracts shorter than this are treated as placeholders and nulled
    pub min_abstract_len: usize,
    /// Outer deadline, checked between sources
    pub max_runtime: Duration,
    /// Bearer key selecting which API keys may be spent
    pub auth_key: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceTag::Dimensions,
                SourceTag::Scopus,
                SourceTag::Pubmed,
                SourceTag::Wos,
            ],
            batch_size: 25,
            min_abstract_len: 25,
            max_runtime: Duration::from_secs(300),
            auth_key: String::new(),
        }
    }
}

/// Counters from one drainer run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub n_loops: usize,
    pub n_processed: usize,
}

/// The fetch seam: `(source, references, key) -> outcome`. Production code
/// dispatches to the adapters; tests plug in deterministic providers.
pub type FetchFn<'a> =
    dyn FnMut(SourceTag, &[Reference], &ApiKey) -> Result<FetchOutcome, FetchError> + 'a;

/// Adapter-backed fetch function with one tuned HTTP client per source.
pub fn live_fetcher() -> impl FnMut(SourceTag, &[Reference], &ApiKey) -> Result<FetchOutcome, FetchError>
{
    let mut clients: HashMap<SourceTag, lacuna_core::RequestClient> = HashMap::new();
    move |tag, refs, key| {
        let source = Source::new(tag);
        let client = clients.entry(tag).or_insert_with(|| source.make_client());
        source.fetch(client, refs, key)
    }
}

/// Wrap a meta-cache failure as fatal. Retrying against an unusable store
/// only spins, and skipping the bookkeeping would break queue advancement.
fn fatal(e: anyhow::Error) -> anyhow::Error {
    anyhow::Error::new(FetchError::Fatal(format!("{e:#}")))
}

/// Did a fatal error escape a batch?
fn is_fatal(e: &anyhow::Error) -> bool {
    e.downcast_ref::<FetchError>()
        .is_some_and(FetchError::is_fatal)
}

/// The on-conflict decision for one queue entry at its head source.
pub fn should_fetch(entry: &QueuedRequested) -> bool {
    // force run for this source
    entry.priority == SourcePriority::Force
        // don't check existing results, work the entry (again)
        || entry.entry.on_conflict == OnConflict::Force
        // we asked before but have no abstract from anywhere -> retry
        || (entry.entry.on_conflict == OnConflict::RetryAbstract && entry.num_has_abstract == 0)
        // we asked before but this source never returned a payload -> retry
        || (entry.entry.on_conflict == OnConflict::RetryRaw && entry.num_has_source_raw == 0)
        // this source was never asked for this reference
        || (entry.entry.on_conflict == OnConflict::DoNothing && entry.num_has_source_request == 0)
}

/// Drain one `(source, batch)` pair. Returns the number of queue entries
/// seen (zero means the source's backlog is empty).
pub fn run_source_batch(
    store: &mut CacheStore,
    source: SourceTag,
    config: &WorkerConfig,
    fetch: &mut FetchFn,
) -> Result<usize> {
    let queued = store
        .get_queued_requested_for_source(source, config.batch_size)
        .context("failed to read queue batch")
        .map_err(fatal)?;
    if queued.is_empty() {
        return Ok(0);
    }

    let adapter = Source::new(source);
    let mut proceeding: Vec<&QueuedRequested> = Vec::new();
    let mut invalid: Vec<i64> = Vec::new();

    for row in &queued {
        if !should_fetch(row) {
            log::debug!(
                "queue entry {}: evidence exists, skipping {source}",
                row.entry.queue_id
            );
            continue;
        }
        if adapter.accepts(&row.entry.reference) {
            proceeding.push(row);
        } else {
            log::debug!(
                "queue entry {}: no usable identifiers for {source}",
                row.entry.queue_id
            );
            invalid.push(row.entry.queue_id);
        }
    }

    if !invalid.is_empty() {
        log::debug!(
            "{source}: {} entries have no usable identifiers, dropping the source for them",
            invalid.len()
        );
    }

    let entries: Vec<_> = queued.iter().map(|row| row.entry.clone()).collect();
    let mut ids_found_abstract: FxHashSet<i64> = FxHashSet::default();
    let mut ids_untouched: FxHashSet<i64> = FxHashSet::default();

    for chunk in proceeding.chunks(adapter.max_refs_per_fetch().max(1)) {
        let refs: Vec<Reference> = chunk.iter().map(|row| row.entry.reference.clone()).collect();

        let key = match store.acquire_key(&config.auth_key, source).map_err(fatal)? {
            Some(key) => key,
            None => {
                log::warn!("no active {source} API key for this auth key, leaving batch queued");
                ids_untouched.extend(chunk.iter().map(|row| row.entry.queue_id));
                continue;
            }
        };

        match fetch(source, &refs, &key) {
            Ok(outcome) => {
                store
                    .record_key_use(&key.api_key_id, outcome.api_feedback.as_ref())
                    .map_err(fatal)?;
                for mut request in outcome.requests {
                    request.api_key_id = Some(key.api_key_id.clone());

                    // Placeholder strings are not abstracts
                    if request
                        .abstract_text
                        .as_deref()
                        .map_or(0, |a| a.chars().count())
                        < config.min_abstract_len
                    {
                        request.abstract_text = None;
                    }

                    complete_ids(&mut request, &entries);

                    if request.has_abstract() {
                        for entry in &entries {
                            if request.reference.matches(&entry.reference) {
                                ids_found_abstract.insert(entry.queue_id);
                            }
                        }
                    }
                    store.insert_request(&request).map_err(fatal)?;
                }
            }
            Err(e) if e.is_permanent() => {
                log::warn!("{source} permanently failed for batch chunk: {e}");
                // source is dropped for these entries below
            }
            Err(e) => {
                log::warn!("{source} fetch failed transiently, leaving entries queued: {e}");
                ids_untouched.extend(chunk.iter().map(|row| row.entry.queue_id));
            }
        }
    }

    let ids_found: Vec<i64> = ids_found_abstract.iter().copied().collect();
    let ids_missing: Vec<i64> = queued
        .iter()
        .map(|row| row.entry.queue_id)
        .filter(|id| !ids_found_abstract.contains(id) && !ids_untouched.contains(id))
        .collect();

    log::debug!(
        "{source}: found abstracts for {:?}, advancing {:?}",
        ids_found,
        ids_missing
    );
    store
        .drop_unforced_sources_from_queued(&ids_found)
        .map_err(fatal)?;
    store
        .drop_source_from_queued(source, &ids_missing)
        .map_err(fatal)?;
    store.drop_finished_from_queue().map_err(fatal)?;

    Ok(queued.len())
}

/// The main loop: interleave sources until the queue drains, the deadline
/// passes or shutdown is requested. Returns an error only for fatal
/// meta-cache failures; adapter and HTTP errors stay batch-local.
pub fn run(store: &mut CacheStore, config: &WorkerConfig, fetch: &mut FetchFn) -> Result<RunSummary> {
    let start = Instant::now();
    let mut summary = RunSummary::default();

    log::info!("replacing empty source lists with the default order");
    store.update_default_sources().map_err(fatal)?;

    loop {
        summary.n_loops += 1;
        let mut n_processed = 0usize;

        for &source in &config.sources {
            let elapsed = start.elapsed();
            log::info!(
                "processing source {source} in loop {}; runtime so far: {elapsed:?}",
                summary.n_loops
            );
            if elapsed > config.max_runtime {
                log::info!("reached maximum runtime of {:?}", config.max_runtime);
                return Ok(summary);
            }
            if is_shutdown_requested() {
                log::info!("shutdown requested, stopping drainer");
                return Ok(summary);
            }

            match run_source_batch(store, source, config, fetch) {
                Ok(n) => n_processed += n,
                Err(e) if is_fatal(&e) => {
                    log::error!("meta-cache failure while processing {source}, aborting: {e:#}");
                    return Err(e);
                }
                // Adapter failures never kill a batch; the entries stay
                // queued for the next pass
                Err(e) => log::error!("source {source} failed: {e:#}"),
            }
        }

        summary.n_processed += n_processed;
        if n_processed == 0 {
            log::info!(
                "queue drained after {} loops and {:?}",
                summary.n_loops,
                start.elapsed()
            );
            return Ok(summary);
        }
    }
}
