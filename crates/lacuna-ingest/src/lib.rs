//! Lacuna Ingest - daily OpenAlex delta ingestion
//!
//! Pulls works created or updated on a given day from the OpenAlex API,
//! materialises their inverted-index abstracts, translates them to the Solr
//! document schema and seeds the fetch queue for works that arrive without
//! an abstract.

pub mod abstract_decode;
pub mod api;
pub mod runner;
pub mod transform;
pub mod work;

pub use abstract_decode::decode_abstract;
pub use api::OpenAlexApi;
pub use runner::{ingest_bulk, ingest_day, IngestSummary};
pub use transform::transform_work;
pub use work::Work;
