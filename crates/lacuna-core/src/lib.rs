//! Lacuna Core - Common infrastructure for the abstract-completion pipeline
//!
//! This crate provides the pieces shared by every stage of the pipeline:
//! the rate-limited HTTP client, the data model (references, queue entries,
//! cached requests, API keys), identifier canonicalisation, and the common
//! error type for provider fetches.

pub mod error;
pub mod http;
pub mod ids;
pub mod model;
pub mod shutdown;

// Re-exports for convenience
pub use error::FetchError;
pub use http::{ApiResponse, RequestClient, RequestDelta, RequestSpec};
pub use ids::{strip_url, Reference};
pub use model::{
    default_sources, ApiKey, OnConflict, QueueEntry, Request, SourceList, SourcePriority,
    SourceTag,
};
pub use shutdown::{is_shutdown_requested, register_signal_handlers, request_shutdown};
