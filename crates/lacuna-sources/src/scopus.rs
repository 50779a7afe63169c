//! Scopus adapter
//!
//! Advanced search over `EID(...)` / `DOI(...)` clauses, paged by cursor.
//! Quota counters come back in `x-ratelimit-*` headers and are forwarded as
//! key feedback.

use serde_json::{json, Value};

use lacuna_core::model::{ApiKey, Request, SourceTag};
use lacuna_core::{FetchError, Reference, RequestClient, RequestSpec};

use crate::{get, get_str, FetchOutcome};

pub const PAGE_SIZE: usize = 25;

const SEARCH_URL: &str = "https://api.elsevier.com/content/search/scopus";

/// `EID(...) OR DOI(...)` advanced query over all usable identifiers.
pub fn build_query(refs: &[Reference]) -> Result<String, FetchError> {
    let mut parts: Vec<String> = Vec::new();
    for reference in refs {
        if let Some(eid) = &reference.scopus_id {
            parts.push(format!("EID({eid})"));
        }
        if let Some(doi) = &reference.doi {
            parts.push(format!("DOI({doi})"));
        }
    }
    parts.dedup();
    if parts.is_empty() {
        return Err(FetchError::InvalidRequest(
            "no scopus ids or DOIs to query scopus".into(),
        ));
    }
    Ok(parts.join(" OR "))
}

/// One search entry into a request row; the entry is kept verbatim in `raw`.
pub fn parse_record(entry: &Value) -> Request {
    let reference = Reference {
        doi: get_str(entry, &["prism:doi"]),
        scopus_id: get_str(entry, &["eid"]),
        ..Default::default()
    };
    let mut request = Request::new(SourceTag::Scopus, reference);
    request.title = get_str(entry, &["dc:title"]);
    request.abstract_text = get_str(entry, &["dc:description"]);
    request.raw = Some(entry.clone());
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
        log::debug!("scopus: fetching page {n_pages}");
        let response = client.execute(
            &RequestSpec::get(SEARCH_URL)
                .param("query", query.clone())
                .param("cursor", cursor.clone())
                .param("view", "COMPLETE")
                .header("Accept", "application/json")
                .header("X-ELS-APIKey", key.api_key.clone()),
        )?;

        outcome.api_feedback = Some(ratelimit_feedback(&response));

        n_pages += 1;
        let data = response.json()?;

        let next_cursor = get_str(&data, &["search-results", "cursor", "@next"]);
        let entries = get(&data, &["search-results", "entry"])
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let n_results = get(&data, &["search-results", "opensearch:totalResults"])
            .map(count_value)
            .unwrap_or(0);

        if entries.is_empty() || n_results == 0 {
            break;
        }
        // A single error entry is Scopus for "no results"
        if entries.len() == 1 && entries[0].get("error").is_some() {
            break;
        }

        for entry in &entries {
            let request = parse_record(entry);
            outcome.requests.push(request);
        }
        log::debug!(
            "scopus: {} records after page {n_pages}",
            outcome.requests.len()
        );

        match next_cursor {
            Some(next) if n_pages < crate::Source::new(SourceTag::Scopus).max_pages_per_fetch() => {
                cursor = next;
            }
            _ => break,
        }
    }

    Ok(outcome)
}

/// Quota counters from the response headers; numeric where they parse.
fn ratelimit_feedback(response: &lacuna_core::ApiResponse) -> Value {
    json!({
        "limit": header_count(response, "x-ratelimit-limit"),
        "remaining": header_count(response, "x-ratelimit-remaining"),
        "reset": response.header("x-ratelimit-reset"),
    })
}

fn header_count(response: &lacuna_core::ApiResponse, name: &str) -> Value {
    match response.header(name) {
        Some(v) => match v.parse::<i64>() {
            Ok(n) => json!(n),
            Err(_) => json!(v),
        },
        None => Value::Null,
    }
}

/// Scopus serialises counts as strings; accept both forms.
fn count_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_from_doi_and_eid() {
        let refs = vec![
            Reference {
                doi: Some("10.1/x".into()),
                ..Default::default()
            },
            Reference {
                scopus_id: Some("2-s2.0-1".into()),
                doi: Some("10.2/y".into()),
                ..Default::default()
            },
        ];
        assert_eq!(
            build_query(&refs).unwrap(),
            "DOI(10.1/x) OR EID(2-s2.0-1) OR DOI(10.2/y)"
        );
    }

    #[test]
    fn query_without_ids_is_invalid() {
        let refs = vec![Reference {
            openalex_id: Some("W1".into()),
            ..Default::default()
        }];
        assert!(matches!(
            build_query(&refs),
            Err(FetchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn parse_entry_fields() {
        let entry = json!({
            "eid": "2-s2.0-1",
            "dc:title": "T",
            "dc:description": "A sufficiently long abstract for the test",
            "prism:doi": "10.1/x",
            "prism:coverDate": "2024-01-01"
        });
        let request = parse_record(&entry);
        assert_eq!(request.wrapper, SourceTag::Scopus);
        assert_eq!(request.reference.scopus_id.as_deref(), Some("2-s2.0-1"));
        assert_eq!(request.reference.doi.as_deref(), Some("10.1/x"));
        assert_eq!(request.title.as_deref(), Some("T"));
        assert_eq!(
            request.abstract_text.as_deref(),
            Some("A sufficiently long abstract for the test")
        );
        assert_eq!(request.raw.as_ref().unwrap(), &entry);
    }

    #[test]
    fn parse_entry_missing_abstract() {
        let entry = json!({"eid": "2-s2.0-2", "dc:title": "T"});
        let request = parse_record(&entry);
        assert_eq!(request.abstract_text, None);
        assert_eq!(request.reference.doi, None);
    }

    #[test]
    fn count_value_string_and_number() {
        assert_eq!(count_value(&json!("123")), 123);
        assert_eq!(count_value(&json!(7)), 7);
        assert_eq!(count_value(&json!(null)), 0);
        assert_eq!(count_value(&json!("junk")), 0);
    }
}
