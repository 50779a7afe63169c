//! Dimensions adapter
//!
//! DSL queries (`search publications where ... return publications[...]`)
//! paged by `limit`/`skip`. Credentials are exchanged for a short-lived JWT;
//! a 401 mid-fetch triggers a transparent re-exchange through the client's
//! status-handler hook.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use lacuna_core::model::{ApiKey, Request, SourceTag};
use lacuna_core::{FetchError, Reference, RequestClient, RequestDelta, RequestSpec};

use crate::{get, get_str, FetchOutcome};

pub const PAGE_SIZE: usize = 1000;

const DSL_URL: &str = "https://app.dimensions.ai/api/dsl/v2";
const AUTH_URL: &str = "https://app.dimensions.ai/api/auth.json";

/// Fields requested per publication.
const FIELDS: [&str; 23] = [
    "title",
    "type",
    "abstract",
    "authors_count",
    "date",
    "year",
    "authors",
    "journal",
    "document_type",
    "doi",
    "id",
    "publisher",
    "research_org_country_names",
    "research_org_names",
    "researchers",
    "times_cited",
    "editors",
    "supporting_grant_ids",
    "book_doi",
    "book_title",
    "subtitles",
    "book_series_title",
    "proceedings_title",
];

/// DSL search over DOIs, Dimensions IDs and PMIDs.
pub fn build_query(refs: &[Reference]) -> Result<String, FetchError> {
    let mut dois: Vec<String> = Vec::new();
    let mut ids: Vec<String> = Vec::new();
    let mut pmids: Vec<String> = Vec::new();
    for reference in refs {
        if let Some(doi) = &reference.doi {
            dois.push(format!("\"{doi}\""));
        }
        if let Some(id) = &reference.dimensions_id {
            ids.push(format!("\"{id}\""));
        }
        if let Some(pmid) = &reference.pubmed_id {
            pmids.push(format!("\"{pmid}\""));
        }
    }

    let mut filters: Vec<String> = Vec::new();
    if !dois.is_empty() {
        filters.push(format!("doi in [{}]", dois.join(",")));
    }
    if !ids.is_empty() {
        filters.push(format!("id in [{}]", ids.join(",")));
    }
    if !pmids.is_empty() {
        filters.push(format!("pmid in [{}]", pmids.join(",")));
    }
    if filters.is_empty() {
        return Err(FetchError::InvalidRequest(
            "no pmids, dimensions ids or DOIs to query dimensions".into(),
        ));
    }

    Ok(format!(
        "search publications where {} return publications[{}]",
        filters.join(" or "),
        FIELDS.join("+")
    ))
}

/// One publication into a request row; the payload is kept verbatim.
pub fn parse_record(entry: &Value) -> Request {
    let reference = Reference {
        doi: get_str(entry, &["doi"]),
        dimensions_id: get_str(entry, &["id"]),
        ..Default::default()
    };
    let mut request = Request::new(SourceTag::Dimensions, reference);
    request.title = get_str(entry, &["title"]);
    request.abstract_text = get_str(entry, &["abstract"]);
    request.raw = Some(entry.clone());
    request
}

/// Exchange the long-lived API key for a JWT.
fn exchange_jwt(api_key: &str) -> Result<String, FetchError> {
    let mut client = RequestClient::new(2.0);
    let response = client.execute(
        &RequestSpec::post(AUTH_URL).body_json(json!({ "key": api_key })),
    )?;
    let data = response.json()?;
    get_str(&data, &["token"])
        .ok_or_else(|| FetchError::Parse("no token in dimensions auth response".into()))
}

pub fn fetch(
    client: &mut RequestClient,
    refs: &[Reference],
    key: &ApiKey,
) -> Result<FetchOutcome, FetchError> {
    let query = build_query(refs)?;

    // Start from the JWT cached on the key; refresh on the first 401
    let cached_jwt = key
        .api_feedback
        .as_ref()
        .and_then(|f| get_str(f, &["jwt"]))
        .unwrap_or_default();
    let jwt = Arc::new(Mutex::new(cached_jwt));

    {
        let jwt = jwt.clone();
        let api_key = key.api_key.clone();
        client.register_status_handler(401, move |_response| {
            log::debug!("dimensions: refreshing JWT");
            let token = exchange_jwt(&api_key)?;
            let delta = RequestDelta::default().header("Authorization", format!("JWT {token}"));
            *jwt.lock().unwrap() = token;
            Ok(delta)
        });
    }

    let mut outcome = FetchOutcome::default();
    let mut n_pages = 0usize;
    let mut n_records = 0u64;

    loop {
        log::debug!("dimensions: fetching page {n_pages}");
        let authorization = format!("JWT {}", jwt.lock().unwrap());
        let response = client.execute(
            &RequestSpec::post(DSL_URL)
                .header("Accept", "application/json")
                .header("Authorization", authorization)
                .body_text(format!(
                    "{query} limit {PAGE_SIZE} skip {}",
                    n_pages * PAGE_SIZE
                )),
        )?;

        n_pages += 1;
        let data = response.json()?;

        let n_results = get(&data, &["_stats", "total_count"])
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let entries = get(&data, &["publications"])
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if entries.is_empty() || n_results == 0 {
            break;
        }

        for entry in &entries {
            n_records += 1;
            outcome.requests.push(parse_record(entry));
        }
        log::debug!("dimensions: {n_records}/{n_results} records after page {n_pages}");

        if n_records >= n_results
            || n_pages >= crate::Source::new(SourceTag::Dimensions).max_pages_per_fetch()
        {
            break;
        }
    }

    let token = jwt.lock().unwrap().clone();
    if !token.is_empty() {
        outcome.api_feedback = Some(json!({ "jwt": token }));
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_combines_id_kinds() {
        let refs = vec![
            Reference {
                doi: Some("10.1/x".into()),
                ..Default::default()
            },
            Reference {
                dimensions_id: Some("pub.100".into()),
                pubmed_id: Some("42".into()),
                ..Default::default()
            },
        ];
        let query = build_query(&refs).unwrap();
        assert!(query.starts_with("search publications where "));
        assert!(query.contains(r#"doi in ["10.1/x"]"#));
        assert!(query.contains(r#"id in ["pub.100"]"#));
        assert!(query.contains(r#"pmid in ["42"]"#));
        assert!(query.contains("return publications[title+type+abstract"));
    }

    #[test]
    fn query_without_ids_is_invalid() {
        assert!(matches!(
            build_query(&[Reference::default()]),
            Err(FetchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn parse_publication_fields() {
        let entry = json!({
            "id": "pub.100",
            "doi": "10.1/x",
            "title": "T",
            "abstract": "A sufficiently long abstract for the test",
            "year": 2024
        });
        let request = parse_record(&entry);
        assert_eq!(request.wrapper, SourceTag::Dimensions);
        assert_eq!(request.reference.dimensions_id.as_deref(), Some("pub.100"));
        assert_eq!(request.reference.doi.as_deref(), Some("10.1/x"));
        assert_eq!(request.title.as_deref(), Some("T"));
        assert!(request.has_abstract());
        assert_eq!(request.raw.as_ref().unwrap(), &entry);
    }

    #[test]
    fn parse_publication_no_abstract() {
        let request = parse_record(&json!({"id": "pub.101", "title": "T"}));
        assert!(!request.has_abstract());
    }
}
