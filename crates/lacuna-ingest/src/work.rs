//! Serde model of the OpenAlex work payload
//!
//! Only the fields the Solr translation needs; everything else in the
//! payload is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Work {
    pub id: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub display_name: Option<String>,
    pub publication_year: Option<i64>,
    pub publication_date: Option<String>,
    pub ids: Option<WorkIds>,
    pub language: Option<String>,
    pub primary_location: Option<Location>,
    #[serde(rename = "type")]
    pub work_type: Option<String>,
    pub indexed_in: Option<Vec<String>>,
    pub open_access: Option<OpenAccess>,
    pub authorships: Option<Vec<Authorship>>,
    pub cited_by_count: Option<i64>,
    pub biblio: Option<Biblio>,
    pub is_retracted: Option<bool>,
    pub is_paratext: Option<bool>,
    pub topics: Option<Vec<Topic>>,
    pub locations: Option<Vec<Location>>,
    pub abstract_inverted_index: Option<Value>,
    pub created_date: Option<String>,
    pub updated_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkIds {
    pub mag: Option<Value>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Biblio {
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub first_page: Option<String>,
    pub last_page: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DehydratedAuthor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DehydratedInstitution {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ror: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub institution_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Authorship {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<DehydratedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institutions: Option<Vec<DehydratedInstitution>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_corresponding: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_affiliation_strings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_author_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DehydratedSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issn: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issn_l: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_oa: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landing_page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<DehydratedSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Location as serialised into the Solr field, with the primary flag.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocationOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_oa: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landing_page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<DehydratedSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicHierarchy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topic {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subfield: Option<TopicHierarchy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<TopicHierarchy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<TopicHierarchy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAccess {
    pub any_repository_has_fulltext: Option<bool>,
    pub is_oa: Option<bool>,
    pub oa_status: Option<String>,
    pub oa_url: Option<String>,
}
