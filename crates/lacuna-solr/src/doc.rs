//! Writer-side Solr document schema
//!
//! Nested sub-objects (authorships, locations, topics) are pre-serialised
//! JSON strings — the collection stores them as opaque text fields. `None`
//! fields are omitted from the posted document.

use serde::Serialize;
use serde_json::Value;

/// One work document as posted to Solr by the daily ingest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkDoc {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_abstract: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,

    /// JSON-serialised authorship list, capped by the ingest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorships: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biblio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_in: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cited_by_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_oa: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_paratext: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_retracted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub work_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
}

impl WorkDoc {
    /// Recompute the combined search field from title and abstract.
    pub fn refresh_title_abstract(&mut self) {
        self.title_abstract = match (&self.title, &self.abstract_text) {
            (None, None) => None,
            (title, abstract_text) => Some(format!(
                "{} {}",
                title.as_deref().unwrap_or(""),
                abstract_text.as_deref().unwrap_or("")
            )),
        };
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("work doc serialises")
    }
}
