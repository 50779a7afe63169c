//! Web of Science adapter
//!
//! Starter API with `DO=(...) OR PMID=(...) OR UT=(...)` advanced queries,
//! cursored JSON responses and the `X-ApiKey` header.

use serde_json::{json, Value};

use lacuna_core::model::{ApiKey, Request, SourceTag};
use lacuna_core::{FetchError, Reference, RequestClient, RequestSpec};

use crate::{get, get_str, FetchOutcome};

pub const PAGE_SIZE: usize = 50;

const DOCUMENTS_URL: &str = "https://api.clarivate.com/apis/wos-starter/v1/documents";

/// `DO=(...) OR PMID=(...) OR UT=(...)` over all usable identifiers.
pub fn build_query(refs: &[Reference]) -> Result<String, FetchError> {
    let dois: Vec<&str> = refs.iter().filter_map(|r| r.doi.as_deref()).collect();
    let pmids: Vec<&str> = refs.iter().filter_map(|r| r.pubmed_id.as_deref()).collect();
    let uts: Vec<&str> = refs.iter().filter_map(|r| r.wos_id.as_deref()).collect();

    let mut parts: Vec<String> = Vec::new();
    if !dois.is_empty() {
        parts.push(format!("DO=({})", dois.join(" ")));
    }
    if !pmids.is_empty() {
        parts.push(format!("PMID=({})", pmids.join(" ")));
    }
    if !uts.is_empty() {
        parts.push(format!("UT=({})", uts.join(" ")));
    }
    if parts.is_empty() {
        return Err(FetchError::InvalidRequest(
            "no pubmed ids, wos ids, or DOIs to query the web of science".into(),
        ));
    }
    Ok(parts.join(" OR "))
}

/// One document hit into a request row; the hit is kept verbatim.
pub fn parse_record(hit: &Value) -> Request {
    let reference = Reference {
        doi: get_str(hit, &["identifiers", "doi"]),
        pubmed_id: get_str(hit, &["identifiers", "pmid"]),
        wos_id: get_str(hit, &["uid"]),
        ..Default::default()
    };
    let mut request = Request::new(SourceTag::Wos, reference);
    request.title = get_str(hit, &["title"]);
    request.abstract_text = get_str(hit, &["abstract"]);
    request.raw = Some(hit.clone());
    request
}

pub fn fetch(
    client: &mut RequestClient,
    refs: &[Reference],
    key: &ApiKey,
) -> Result<FetchOutcome, FetchError> {
    let query = build_query(refs)?;
    let mut outcome = FetchOutcome::default();
    let mut cursor = "*".to_string();
    let mut n_pages = 0usize;

    loop {
        log::debug!("wos: fetching page {n_pages}");
        let response = client.execute(
            &RequestSpec::get(DOCUMENTS_URL)
                .param("q", query.clone())
                .param("limit", PAGE_SIZE.to_string())
                .param("cursor", cursor.clone())
                .header("Accept", "application/json")
                .header("X-ApiKey", key.api_key.clone()),
        )?;

        outcome.api_feedback = Some(json!({
            "limit": response.header("x-ratelimit-limit"),
            "remaining": response.header("x-ratelimit-remaining"),
            "reset": response.header("x-ratelimit-reset"),
        }));

        n_pages += 1;
        let data = response.json()?;

        let hits = get(&data, &["hits"])
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let n_results = get(&data, &["metadata", "total"])
            .and_then(Value::as_u64)
            .unwrap_or(0);

        if hits.is_empty() || n_results == 0 {
            break;
        }

        for hit in &hits {
            outcome.requests.push(parse_record(hit));
        }
        log::debug!("wos: {} records after page {n_pages}", outcome.requests.len());

        let next_cursor = get_str(&data, &["metadata", "next_cursor"]);
        match next_cursor {
            Some(next) if n_pages < crate::Source::new(SourceTag::Wos).max_pages_per_fetch() => {
                cursor = next;
            }
            _ => break,
        }
    }

    Ok(outcome)
}
