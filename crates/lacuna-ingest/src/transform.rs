//! OpenAlex work → Solr document translation
//!
//! Nested structures are serialised to JSON strings per field; authorships
//! are capped; the inverted-index abstract is materialised to plaintext.

use lacuna_core::strip_url;
use lacuna_solr::WorkDoc;

use crate::abstract_decode::decode_abstract;
use crate::work::{Location, LocationOut, Work};

/// Authorship lists are cut off here; monographs with thousands of authors
/// blow up the index otherwise.
pub const AUTHORSHIP_LIMIT: usize = 50;

const PUBMED_PREFIX: &str = "https://pubmed.ncbi.nlm.nih.gov/";

/// Translate one work into the Solr document shape.
pub fn transform_work(work: &Work) -> WorkDoc {
    let id = work
        .id
        .as_deref()
        .map(|i| strip_url(i).to_string())
        .unwrap_or_default();

    let abstract_text = decode_abstract(work.abstract_inverted_index.as_ref());

    let authorships = work.authorships.as_ref().filter(|a| !a.is_empty()).map(|a| {
        let capped: Vec<_> = a.iter().take(AUTHORSHIP_LIMIT).collect();
        serde_json::to_string(&capped).unwrap_or_default()
    });

    let locations = work
        .locations
        .as_ref()
        .filter(|l| !l.is_empty())
        .map(|locations| {
            let out: Vec<LocationOut> = locations
                .iter()
                .map(|loc| location_out(loc, work.primary_location.as_ref()))
                .collect();
            serde_json::to_string(&out).unwrap_or_default()
        });

    let topics = work
        .topics
        .as_ref()
        .filter(|t| !t.is_empty())
        .map(|t| serde_json::to_string(t).unwrap_or_default());

    let indexed_in = work
        .indexed_in
        .as_ref()
        .filter(|i| !i.is_empty())
        .map(|i| serde_json::to_string(i).unwrap_or_default());

    let biblio = work
        .biblio
        .as_ref()
        .filter(|b| b.volume.is_some())
        .map(|b| {
            serde_json::json!({
                "volume": b.volume,
                "issue": b.issue,
                "first_page": b.first_page,
                "last_page": b.last_page,
            })
            .to_string()
        });

    let (publisher, publisher_id) = work
        .primary_location
        .as_ref()
        .and_then(|loc| loc.source.as_ref())
        .map(|source| {
            (
                source.host_organization_name.clone(),
                source.host_organization.clone(),
            )
        })
        .unwrap_or((None, None));

    let (mag, pmid, pmcid) = work
        .ids
        .as_ref()
        .map(|ids| {
            let mag = ids.mag.as_ref().map(|m| match m.as_str() {
                Some(s) => s.to_string(),
                None => m.to_string(),
            });
            let pmid = ids
                .pmid
                .as_deref()
                .map(|p| p.strip_prefix(PUBMED_PREFIX).unwrap_or(p).to_string());
            (mag, pmid, ids.pmcid.clone())
        })
        .unwrap_or((None, None, None));

    let mut doc = WorkDoc {
        id,
        title: work.title.clone().or_else(|| work.display_name.clone()),
        abstract_source: abstract_text.as_ref().map(|_| "OpenAlex".to_string()),
        abstract_text,
        doi: work.doi.as_deref().map(|d| strip_url(d).to_string()),
        mag,
        pmid,
        pmcid,
        authorships,
        biblio,
        locations,
        topics,
        indexed_in,
        cited_by_count: work.cited_by_count,
        is_oa: work.open_access.as_ref().and_then(|oa| oa.is_oa),
        is_paratext: work.is_paratext,
        is_retracted: work.is_retracted,
        is_published: work
            .primary_location
            .as_ref()
            .and_then(|loc| loc.is_published),
        is_accepted: work
            .primary_location
            .as_ref()
            .and_then(|loc| loc.is_accepted),
        language: work.language.clone(),
        publisher,
        publisher_id,
        publication_date: work.publication_date.clone(),
        publication_year: work.publication_year,
        work_type: work.work_type.clone(),
        created_date: work.created_date.clone(),
        updated_date: work.updated_date.clone(),
        ..Default::default()
    };
    doc.refresh_title_abstract();
    doc
}

fn location_out(location: &Location, primary: Option<&Location>) -> LocationOut {
    let is_primary = primary.map(|p| {
        p.source.as_ref().map(|s| &s.id) == location.source.as_ref().map(|s| &s.id)
            && p.source.as_ref().map(|s| &s.display_name)
                == location.source.as_ref().map(|s| &s.display_name)
            && p.pdf_url == location.pdf_url
            && p.version == location.version
    });
    LocationOut {
        is_oa: location.is_oa,
        is_primary,
        landing_page_url: location.landing_page_url.clone(),
        license: location.license.clone(),
        source: location.source.clone(),
        pdf_url: location.pdf_url.clone(),
        version: location.version.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::Work;
    use serde_json::json;

    fn work(value: serde_json::Value) -> Work {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn ids_stripped_and_abstract_decoded() {
        let doc = transform_work(&work(json!({
            "id": "https://openalex.org/W1",
            "doi": "https://doi.org/10.1/x",
            "title": "T",
            "abstract_inverted_index": {"Hello": [0], "world": [1]},
            "ids": {"pmid": "https://pubmed.ncbi.nlm.nih.gov/42", "mag": 123}
        })));
        assert_eq!(doc.id, "W1");
        assert_eq!(doc.doi.as_deref(), Some("10.1/x"));
        assert_eq!(doc.abstract_text.as_deref(), Some("Hello world"));
        assert_eq!(doc.title_abstract.as_deref(), Some("T Hello world"));
        assert_eq!(doc.abstract_source.as_deref(), Some("OpenAlex"));
        assert_eq!(doc.pmid.as_deref(), Some("42"));
        assert_eq!(doc.mag.as_deref(), Some("123"));
    }

    #[test]
    fn missing_abstract_leaves_source_unset() {
        let doc = transform_work(&work(json!({"id": "W2", "title": "T"})));
        assert_eq!(doc.abstract_text, None);
        assert_eq!(doc.abstract_source, None);
        assert_eq!(doc.title_abstract.as_deref(), Some("T "));
    }

    #[test]
    fn authorships_capped_and_serialised() {
        let authorships: Vec<_> = (0..60)
            .map(|i| json!({"raw_author_name": format!("A{i}")}))
            .collect();
        let doc = transform_work(&work(json!({"id": "W3", "authorships": authorships})));
        let parsed: Vec<serde_json::Value> =
            serde_json::from_str(doc.authorships.as_deref().unwrap()).unwrap();
        assert_eq!(parsed.len(), AUTHORSHIP_LIMIT);
        assert_eq!(parsed[0]["raw_author_name"], "A0");
    }

    #[test]
    fn primary_location_flagged() {
        let location = json!({
            "source": {"id": "S1", "display_name": "Journal"},
            "pdf_url": "http://pdf", "version": "publishedVersion"
        });
        let other = json!({"source": {"id": "S2", "display_name": "Repo"}});
        let doc = transform_work(&work(json!({
            "id": "W4",
            "primary_location": location.clone(),
            "locations": [location, other]
        })));
        let parsed: Vec<serde_json::Value> =
            serde_json::from_str(doc.locations.as_deref().unwrap()).unwrap();
        assert_eq!(parsed[0]["is_primary"], true);
        assert_eq!(parsed[1]["is_primary"], false);
    }

    #[test]
    fn publisher_from_primary_source() {
        let doc = transform_work(&work(json!({
            "id": "W5",
            "primary_location": {"source": {
                "host_organization": "https://openalex.org/P1",
                "host_organization_name": "Publisher"
            }}
        })));
        assert_eq!(doc.publisher.as_deref(), Some("Publisher"));
        assert_eq!(doc.publisher_id.as_deref(), Some("https://openalex.org/P1"));
    }

    #[test]
    fn biblio_requires_volume() {
        let doc = transform_work(&work(json!({
            "id": "W6",
            "biblio": {"issue": "2"}
        })));
        assert_eq!(doc.biblio, None);

        let doc = transform_work(&work(json!({
            "id": "W6",
            "biblio": {"volume": "10", "issue": "2"}
        })));
        assert!(doc.biblio.unwrap().contains("\"volume\":\"10\""));
    }

    #[test]
    fn display_name_fallback_for_title() {
        let doc = transform_work(&work(json!({"id": "W7", "display_name": "DN"})));
        assert_eq!(doc.title.as_deref(), Some("DN"));
    }
}
