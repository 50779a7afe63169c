//! OpenAlex works API with cursor paging

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;

use lacuna_core::{is_shutdown_requested, RequestClient, RequestSpec};

use crate::work::Work;

/// Works per page; the API maximum is 200.
pub const PER_PAGE: usize = 200;

/// Which date facet a daily pull filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    Created,
    Updated,
}

impl DateFilter {
    /// OpenAlex filter expression for one day.
    pub fn for_day(self, date: NaiveDate) -> String {
        let day = date.format("%Y-%m-%d");
        match self {
            Self::Created => format!("from_created_date:{day},to_created_date:{day}"),
            Self::Updated => format!("from_updated_date:{day},to_updated_date:{day}"),
        }
    }
}

/// Client for the OpenAlex REST API.
pub struct OpenAlexApi {
    client: RequestClient,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAlexApi {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            client: RequestClient::new(10.0)
                .with_timeout(std::time::Duration::from_secs(60)),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
        }
    }

    /// Page through all works matching `filter`, invoking `on_page` per
    /// cursor page. Stops early at a shutdown request.
    pub fn fetch_works(
        &mut self,
        filter: &str,
        mut on_page: impl FnMut(Vec<Work>) -> Result<()>,
    ) -> Result<()> {
        let url = format!("{}/works", self.base_url);
        let mut cursor = Some("*".to_string());
        let mut n_pages = 0usize;
        let mut n_works = 0usize;

        while let Some(current) = cursor.take() {
            let mut spec = RequestSpec::get(&url)
                .param("filter", filter)
                .param("per-page", PER_PAGE.to_string())
                .param("cursor", current);
            if let Some(key) = &self.api_key {
                spec = spec.param("api_key", key.clone());
            }

            let response = self
                .client
                .execute(&spec)
                .context("openalex works request failed")?;
            let data = response.json().map_err(|e| anyhow!("{e}"))?;

            n_pages += 1;
            cursor = data["meta"]["next_cursor"].as_str().map(String::from);

            let results = data["results"].as_array().cloned().unwrap_or_default();
            if results.is_empty() {
                break;
            }
            let works: Vec<Work> = results
                .into_iter()
                .filter_map(|value| match serde_json::from_value(value) {
                    Ok(work) => Some(work),
                    Err(e) => {
                        log::warn!("skipping unparseable work: {e}");
                        None
                    }
                })
                .collect();
            n_works += works.len();
            log::debug!("openalex: {n_works} works after page {n_pages}");

            on_page(works)?;

            if is_shutdown_requested() {
                log::info!("shutdown requested, stopping openalex paging");
                break;
            }
        }
        Ok(())
    }
}
