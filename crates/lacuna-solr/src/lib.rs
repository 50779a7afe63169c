//! Lacuna Solr - gap detection and write-back against the search index
//!
//! The index holds ~200M works; this crate finds the ones without abstracts,
//! seeds the fetch queue, and merges recovered abstracts back in without
//! clobbering better data.

pub mod client;
pub mod doc;
pub mod gaps;
pub mod writer;

pub use client::SolrClient;
pub use doc::WorkDoc;
pub use gaps::{seed_queue, MissingWork, SeedSummary, HARD_LIMIT};
pub use writer::{merge_daily_works, transfer_abstracts, TransferSummary};
