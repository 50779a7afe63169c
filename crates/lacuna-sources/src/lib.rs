//! Lacuna Sources - adapters for external bibliographic APIs
//!
//! One adapter per provider, behind the closed [`Source`] set. Adapters turn
//! references into provider queries, page through the responses and yield
//! [`Request`] rows with the verbatim payload attached. They never touch the
//! meta-cache themselves; persisting is the worker's job.

pub mod dimensions;
pub mod pubmed;
pub mod s2;
pub mod scopus;
pub mod wos;

use serde_json::Value;

use lacuna_core::model::{ApiKey, Request, SourceTag};
use lacuna_core::{FetchError, Reference, RequestClient};

/// How the provider expects credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// API key in a request header
    Header,
    /// API key as a query parameter
    Param,
    /// API key exchanged for a short-lived JWT
    JwtExchange,
}

/// Everything one provider fetch produced: the parsed request rows plus the
/// quota metadata that came back with the responses.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub requests: Vec<Request>,
    pub api_feedback: Option<Value>,
}

/// A provider adapter. The set is closed: adding a source is an enumeration
/// change plus a new parser module, not a trait implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source {
    tag: SourceTag,
}

impl Source {
    pub const fn new(tag: SourceTag) -> Self {
        Self { tag }
    }

    pub const fn tag(&self) -> SourceTag {
        self.tag
    }

    /// The reference field holding this provider's own identifier.
    pub fn canonical_id_field(&self) -> &'static str {
        self.tag.canonical_id_field()
    }

    /// Maximum results per provider page.
    pub fn page_size_max(&self) -> usize {
        match self.tag {
            SourceTag::Dimensions => dimensions::PAGE_SIZE,
            SourceTag::Scopus => scopus::PAGE_SIZE,
            SourceTag::Wos => wos::PAGE_SIZE,
            SourceTag::Pubmed => pubmed::PAGE_SIZE,
            SourceTag::S2 => s2::PAGE_SIZE,
        }
    }

    /// Cap on pages a single fetch may pull.
    pub fn max_pages_per_fetch(&self) -> usize {
        10
    }

    /// Upper bound on references per fetch call; the caller splits larger
    /// batches.
    pub fn max_refs_per_fetch(&self) -> usize {
        self.page_size_max() * self.max_pages_per_fetch()
    }

    pub fn auth_style(&self) -> AuthStyle {
        match self.tag {
            SourceTag::Dimensions => AuthStyle::JwtExchange,
            SourceTag::Scopus | SourceTag::Wos | SourceTag::S2 => AuthStyle::Header,
            SourceTag::Pubmed => AuthStyle::Param,
        }
    }

    /// An HTTP client tuned to this provider's rate limit and latency.
    pub fn make_client(&self) -> RequestClient {
        match self.tag {
            SourceTag::Dimensions => RequestClient::new(1.0)
                .with_timeout(std::time::Duration::from_secs(60)),
            SourceTag::Scopus => RequestClient::new(3.0)
                .with_timeout(std::time::Duration::from_secs(60)),
            SourceTag::Wos => RequestClient::new(2.0)
                .with_timeout(std::time::Duration::from_secs(120)),
            SourceTag::Pubmed => RequestClient::new(3.0)
                .with_timeout(std::time::Duration::from_secs(120)),
            SourceTag::S2 => RequestClient::new(1.0),
        }
    }

    /// Can this reference be queried at this provider at all?
    ///
    /// Rule: at least two non-null identifiers among `openalex_id`, `doi`
    /// and the provider's canonical field. PubMed's term language addresses
    /// single identifiers directly, so one of `pubmed_id`/`doi` suffices
    /// there.
    pub fn accepts(&self, reference: &Reference) -> bool {
        match self.tag {
            SourceTag::Pubmed => {
                reference.pubmed_id.is_some() || reference.doi.is_some()
            }
            _ => {
                let known = [
                    reference.openalex_id.is_some(),
                    reference.doi.is_some(),
                    reference.get(self.canonical_id_field()).is_some(),
                ];
                known.iter().filter(|k| **k).count() >= 2
            }
        }
    }

    /// Build the provider query string for a batch of references.
    pub fn build_query(&self, refs: &[Reference]) -> Result<String, FetchError> {
        match self.tag {
            SourceTag::Dimensions => dimensions::build_query(refs),
            SourceTag::Scopus => scopus::build_query(refs),
            SourceTag::Wos => wos::build_query(refs),
            SourceTag::Pubmed => pubmed::build_query(refs),
            SourceTag::S2 => s2::build_query(refs),
        }
    }

    /// Parse one provider record into a request row (pure).
    pub fn parse_record(&self, raw: &Value) -> Result<Request, FetchError> {
        match self.tag {
            SourceTag::Dimensions => Ok(dimensions::parse_record(raw)),
            SourceTag::Scopus => Ok(scopus::parse_record(raw)),
            SourceTag::Wos => Ok(wos::parse_record(raw)),
            SourceTag::Pubmed => Err(FetchError::InvalidRequest(
                "pubmed records are parsed from XML, not JSON".into(),
            )),
            SourceTag::S2 => s2::parse_record(raw),
        }
    }

    /// Query the provider for the given references.
    ///
    /// Yields zero or more requests with `wrapper` set to this source's tag,
    /// the provider payload attached verbatim, and at least one identifier
    /// matching the input. Pagination is internal.
    pub fn fetch(
        &self,
        client: &mut RequestClient,
        refs: &[Reference],
        key: &ApiKey,
    ) -> Result<FetchOutcome, FetchError> {
        if refs.is_empty() {
            return Ok(FetchOutcome::default());
        }
        if refs.len() > self.max_refs_per_fetch() {
            return Err(FetchError::InvalidRequest(format!(
                "{} references exceed the {} per-fetch cap for {}",
                refs.len(),
                self.max_refs_per_fetch(),
                self.tag
            )));
        }
        client.switch_proxy(key.proxy.as_deref());
        match self.tag {
            SourceTag::Dimensions => dimensions::fetch(client, refs, key),
            SourceTag::Scopus => scopus::fetch(client, refs, key),
            SourceTag::Wos => wos::fetch(client, refs, key),
            SourceTag::Pubmed => pubmed::fetch(client, refs, key),
            SourceTag::S2 => s2::fetch(client, refs, key),
        }
    }
}

/// Navigate nested JSON by key path.
pub(crate) fn get<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in keys {
        current = current.get(key)?;
    }
    Some(current)
}

/// String at a nested JSON path, if present and non-empty.
pub(crate) fn get_str(value: &Value, keys: &[&str]) -> Option<String> {
    get(value, keys)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
