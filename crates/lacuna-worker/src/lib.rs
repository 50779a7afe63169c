//! Lacuna Worker - the queue drainer
//!
//! Bounded-time main loop that interleaves sources: per source, pull a batch
//! of queue entries with their request aggregates, apply the on-conflict
//! policy, fetch through the adapter, persist the responses and advance the
//! queue.

pub mod drainer;

pub use drainer::{live_fetcher, run, run_source_batch, should_fetch, RunSummary, WorkerConfig};
