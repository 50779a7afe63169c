//! Thin Solr HTTP client
//!
//! Select and JSON-update against one collection, with the shared
//! rate-limited client underneath for retry on transient 5xx.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use lacuna_core::{RequestClient, RequestSpec};

/// Client bound to one Solr collection.
pub struct SolrClient {
    http: RequestClient,
    base_url: String,
    collection: String,
}

impl SolrClient {
    pub fn new(base_url: &str, collection: &str) -> Self {
        Self {
            // Solr sits next to us; generous rate, long timeout for commits
            http: RequestClient::new(20.0)
                .with_timeout(std::time::Duration::from_secs(240)),
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/api/collections/{}", self.base_url, self.collection)
    }

    /// Run a select query, returning the parsed response body.
    pub fn select(&mut self, query: &str, params: &[(&str, &str)]) -> Result<Value> {
        let mut spec = RequestSpec::get(format!("{}/select", self.collection_url()))
            .param("q", query)
            .param("q.op", "AND")
            .param("useParams", "")
            .param("defType", "lucene");
        for (key, value) in params {
            spec = spec.param(*key, *value);
        }
        let response = self
            .http
            .execute(&spec)
            .context("solr select request failed")?;
        response.json().map_err(|e| anyhow!("{e}"))
    }

    /// The documents of a select response.
    pub fn select_docs(&mut self, query: &str, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        let data = self.select(query, params)?;
        Ok(data["response"]["docs"]
            .as_array()
            .cloned()
            .unwrap_or_default())
    }

    /// Post documents to the update handler and commit.
    ///
    /// Documents may be full replacements or atomic `{"set": ...}` partial
    /// updates; Solr applies either per document.
    pub fn update(&mut self, docs: &[Value]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let payload = serde_json::to_string(&docs)?;
        self.http
            .execute(
                &RequestSpec::post(format!("{}/update?commit=true", self.collection_url()))
                    .header("Content-Type", "application/json")
                    .body_text(payload),
            )
            .context("solr update request failed")?;
        log::debug!("posted {} documents to solr", docs.len());
        Ok(())
    }
}
