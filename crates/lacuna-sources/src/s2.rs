//! Semantic Scholar adapter — reserved, not yet implemented
//!
//! The `S2` tag exists so queue entries and request rows can reference it;
//! any attempt to fetch fails as an invalid request, which drops the source
//! from the affected queue entries instead of looping on it.

use serde_json::Value;

use lacuna_core::model::{ApiKey, Request};
use lacuna_core::{FetchError, Reference, RequestClient};

use crate::FetchOutcome;

pub const PAGE_SIZE: usize = 100;

pub fn build_query(_refs: &[Reference]) -> Result<String, FetchError> {
    Err(not_implemented())
}

pub fn parse_record(_raw: &Value) -> Result<Request, FetchError> {
    Err(not_implemented())
}

pub fn fetch(
    _client: &mut RequestClient,
    _refs: &[Reference],
    _key: &ApiKey,
) -> Result<FetchOutcome, FetchError> {
    Err(not_implemented())
}

fn not_implemented() -> FetchError {
    FetchError::InvalidRequest("semantic scholar adapter not implemented".into())
}
