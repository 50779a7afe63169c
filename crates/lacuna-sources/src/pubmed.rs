//! PubMed adapter
//!
//! Two-step eutils flow: `esearch` with `usehistory=y` opens a history
//! session, `efetch` drains it as PubMed XML. Terms address identifiers
//! directly (`[PMID]`, `[DOI]` descriptors), batched at most ten per search.
//! The raw payload kept per article is the verbatim `<PubmedArticle>` XML,
//! wrapped as `{"xml": ...}` — PubMed is the one provider that does not
//! speak JSON.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::json;

use lacuna_core::model::{ApiKey, Request, SourceTag};
use lacuna_core::{FetchError, Reference, RequestClient, RequestSpec};

use crate::FetchOutcome;

pub const PAGE_SIZE: usize = 10;

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

/// ` OR `-joined `[PMID]`/`[DOI]` terms over all usable identifiers.
pub fn build_query(refs: &[Reference]) -> Result<String, FetchError> {
    let mut parts: Vec<String> = Vec::new();
    for reference in refs {
        if let Some(pmid) = &reference.pubmed_id {
            parts.push(format!("{pmid}[PMID]"));
        }
        if let Some(doi) = &reference.doi {
            parts.push(format!("\"{doi}\"[DOI]"));
        }
    }
    if parts.is_empty() {
        return Err(FetchError::InvalidRequest(
            "no pubmed ids or DOIs to query pubmed".into(),
        ));
    }
    Ok(parts.join(" OR "))
}

pub fn fetch(
    client: &mut RequestClient,
    refs: &[Reference],
    key: &ApiKey,
) -> Result<FetchOutcome, FetchError> {
    let mut outcome = FetchOutcome::default();

    for (n_batch, batch) in refs.chunks(PAGE_SIZE).enumerate() {
        let term = build_query(batch)?;

        log::debug!("pubmed: fetching search context (batch {n_batch})");
        let search_page = client.execute(
            &RequestSpec::get(ESEARCH_URL)
                .param("api_key", key.api_key.clone())
                .param("db", "pubmed")
                .param("term", term)
                .param("usehistory", "y"),
        )?;
        let web_env = first_tag_text(&search_page.body, b"WebEnv")?
            .ok_or_else(|| FetchError::Parse("no WebEnv in esearch response".into()))?;
        let query_key = first_tag_text(&search_page.body, b"QueryKey")?
            .ok_or_else(|| FetchError::Parse("no QueryKey in esearch response".into()))?;

        let result_page = client.execute(
            &RequestSpec::get(EFETCH_URL)
                .param("api_key", key.api_key.clone())
                .param("db", "pubmed")
                .param("WebEnv", web_env)
                .param("query_key", query_key)
                .param("retmode", "xml"),
        )?;

        for article_xml in article_chunks(&result_page.body) {
            match parse_article(article_xml) {
                Ok(article) => {
                    let reference = Reference {
                        pubmed_id: article.pmid,
                        doi: article.doi,
                        ..Default::default()
                    };
                    let mut request = Request::new(SourceTag::Pubmed, reference);
                    request.title = article.title;
                    request.abstract_text = article.abstract_text;
                    request.raw = Some(json!({ "xml": article_xml }));
                    outcome.requests.push(request);
                }
                Err(e) => log::debug!("pubmed: failed to parse article: {e}"),
            }
        }
        log::debug!(
            "pubmed: {} records after batch {n_batch}",
            outcome.requests.len()
        );
    }

    Ok(outcome)
}

/// Verbatim `<PubmedArticle>...</PubmedArticle>` spans of an efetch body.
/// The element never nests, so plain scanning is safe.
fn article_chunks(xml: &str) -> impl Iterator<Item = &str> {
    let mut rest = xml;
    std::iter::from_fn(move || {
        let start = find_article_start(rest)?;
        let end = rest[start..].find("</PubmedArticle>")? + start + "</PubmedArticle>".len();
        let chunk = &rest[start..end];
        rest = &rest[end..];
        Some(chunk)
    })
}

/// Offset of the next `<PubmedArticle>` start tag, not matching the
/// enclosing `<PubmedArticleSet>`.
fn find_article_start(s: &str) -> Option<usize> {
    const TAG: &str = "<PubmedArticle";
    let mut from = 0;
    while let Some(i) = s[from..].find(TAG) {
        let idx = from + i;
        match s[idx + TAG.len()..].chars().next() {
            Some('>') => return Some(idx),
            Some(c) if c.is_whitespace() => return Some(idx),
            _ => from = idx + TAG.len(),
        }
    }
    None
}

#[derive(Debug, Default)]
struct ParsedArticle {
    pmid: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    abstract_text: Option<String>,
}

/// Pull identifiers, title and abstract out of one article element.
fn parse_article(xml: &str) -> Result<ParsedArticle, FetchError> {
    // Whitespace around inline markup (<i>, <sub>, ...) is significant, so
    // text events are not trimmed; extracted values are trimmed at the end.
    let mut reader = Reader::from_str(xml);

    let mut article = ParsedArticle::default();
    let mut sections: Vec<String> = Vec::new();
    let mut in_abstract = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => match e.name().as_ref() {
                b"PMID" if article.pmid.is_none() => {
                    article.pmid = non_empty(read_text_content(&mut reader, b"PMID")?);
                }
                b"ArticleTitle" if article.title.is_none() => {
                    article.title = non_empty(read_text_content(&mut reader, b"ArticleTitle")?);
                }
                b"Abstract" => in_abstract = true,
                b"AbstractText" if in_abstract => {
                    if let Some(text) = non_empty(read_text_content(&mut reader, b"AbstractText")?)
                    {
                        sections.push(text);
                    }
                }
                b"ArticleId" => {
                    let is_doi = e
                        .try_get_attribute("IdType")
                        .map_err(xml_error)?
                        .map(|a| a.value.as_ref() == b"doi".as_slice())
                        .unwrap_or(false);
                    let text = read_text_content(&mut reader, b"ArticleId")?;
                    if is_doi && article.doi.is_none() {
                        article.doi = non_empty(text);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Abstract" => in_abstract = false,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !sections.is_empty() {
        article.abstract_text = Some(sections.join("\n\n"));
    }
    Ok(article)
}

/// Read text content of a specific element, handling nested markup tags.
fn read_text_content(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<String, FetchError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Text(e) => text.push_str(&e.unescape().map_err(xml_error)?),
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && e.name().as_ref() == end_tag {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text.trim().to_string())
}

/// Text of the first occurrence of `tag` in a document.
fn first_tag_text(xml: &str, tag: &[u8]) -> Result<Option<String>, FetchError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) if e.name().as_ref() == tag => {
                return Ok(non_empty(read_text_content(&mut reader, tag)?));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn xml_error(e: impl std::fmt::Display) -> FetchError {
    FetchError::Parse(format!("XML parse error: {e}"))
}
