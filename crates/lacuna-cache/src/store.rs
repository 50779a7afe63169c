//! Meta-cache store operations
//!
//! Backlog queries, conflict-aware queue updates and request persistence.
//! The queue's `sources` column is a JSON array of `["TAG", priority]`
//! tuples; the head of the list is the next source to attempt. Queue/request
//! matching joins on equality of any shared identifier — the aggregate counts
//! drive a policy, not correctness, so duplicates are tolerated.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use rustc_hash::FxHashSet;

use lacuna_core::model::{OnConflict, QueueEntry, Request, SourceList, SourcePriority, SourceTag};
use lacuna_core::{default_sources, Reference};

use crate::schema::init_schema;

/// One queue row augmented with per-reference aggregates from the request
/// table, as consumed by the worker's on-conflict decision.
#[derive(Debug, Clone)]
pub struct QueuedRequested {
    pub entry: QueueEntry,
    /// Priority of the head source
    pub priority: SourcePriority,
    pub num_has_request: i64,
    pub num_has_abstract: i64,
    pub num_has_title: i64,
    pub num_has_raw: i64,
    pub num_has_source_request: i64,
    pub num_has_source_abstract: i64,
    pub num_has_source_title: i64,
    pub num_has_source_raw: i64,
}

/// Backlog counters for the status command.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Pending queue entries per head source (unassigned = sources NULL)
    pub queued_by_source: Vec<(String, i64)>,
    pub queue_total: i64,
    pub request_total: i64,
    pub request_with_abstract: i64,
    pub request_unsolarized: i64,
}

/// Durable relational store for requests, the queue and credentials.
pub struct CacheStore {
    conn: Connection,
}

impl CacheStore {
    /// Open (and migrate) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open cache db: {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL")?;
        conn.pragma_update(None, "busy_timeout", 10_000)?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory store, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Bulk-insert queue entries. Identifier URLs are stripped at this
    /// boundary; the `sources` ordering is preserved verbatim.
    pub fn queue_requests(&mut self, entries: &[QueueEntry]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO queue (openalex_id, doi, pubmed_id, s2_id, scopus_id, wos_id,
                                    dimensions_id, nacsos_id, sources, on_conflict, time_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for entry in entries {
                let mut reference = entry.reference.clone();
                reference.canonicalise();
                let sources = entry
                    .sources
                    .as_ref()
                    .map(|s| serde_json::to_string(s))
                    .transpose()?;
                stmt.execute(params![
                    reference.openalex_id,
                    reference.doi,
                    reference.pubmed_id,
                    reference.s2_id,
                    reference.scopus_id,
                    reference.wos_id,
                    reference.dimensions_id,
                    reference.nacsos_id,
                    sources,
                    entry.on_conflict.as_u8(),
                    format_time(&entry.time_created),
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    /// Assign the default ordered source list to entries queued without one.
    pub fn update_default_sources(&self) -> Result<usize> {
        let sources = serde_json::to_string(&default_sources())?;
        let n = self
            .conn
            .execute("UPDATE queue SET sources = ?1 WHERE sources IS NULL", [sources])
            .context("failed to assign default sources")?;
        if n > 0 {
            log::debug!("assigned default source list to {n} queue entries");
        }
        Ok(n)
    }

    /// Up to `limit` queue rows whose head source equals `source`.
    pub fn get_queued_for_source(&self, source: SourceTag, limit: usize) -> Result<Vec<QueueEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT queue_id, openalex_id, doi, pubmed_id, s2_id, scopus_id, wos_id,
                    dimensions_id, nacsos_id, sources, on_conflict, time_created
             FROM queue
             WHERE sources IS NOT NULL
               AND json_extract(sources, '$[0][0]') = ?1
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![source.as_str(), limit as i64], queue_entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Same as [`get_queued_for_source`], augmented with aggregate counts
    /// from the request table (joined on any identifier equality).
    pub fn get_queued_requested_for_source(
        &self,
        source: SourceTag,
        limit: usize,
    ) -> Result<Vec<QueuedRequested>> {
        let mut stmt = self.conn.prepare(
            "SELECT q.queue_id, q.openalex_id, q.doi, q.pubmed_id, q.s2_id, q.scopus_id,
                    q.wos_id, q.dimensions_id, q.nacsos_id, q.sources, q.on_conflict,
                    q.time_created,
                    json_extract(q.sources, '$[0][1]') AS priority,
                    count(1) FILTER (WHERE r.record_id IS NOT NULL) AS num_has_request,
                    count(1) FILTER (WHERE r.abstract IS NOT NULL)  AS num_has_abstract,
                    count(1) FILTER (WHERE r.title IS NOT NULL)     AS num_has_title,
                    count(1) FILTER (WHERE r.raw IS NOT NULL)       AS num_has_raw,
                    count(1) FILTER (WHERE r.record_id IS NOT NULL AND r.wrapper = ?1)
                        AS num_has_source_request,
                    count(1) FILTER (WHERE r.abstract IS NOT NULL AND r.wrapper = ?1)
                        AS num_has_source_abstract,
                    count(1) FILTER (WHERE r.title IS NOT NULL AND r.wrapper = ?1)
                        AS num_has_source_title,
                    count(1) FILTER (WHERE r.raw IS NOT NULL AND r.wrapper = ?1)
                        AS num_has_source_raw
             FROM queue q
                  LEFT OUTER JOIN request r ON
                     (q.doi IS NOT NULL AND q.doi = r.doi)
                  OR (q.openalex_id IS NOT NULL AND q.openalex_id = r.openalex_id)
                  OR (q.pubmed_id IS NOT NULL AND q.pubmed_id = r.pubmed_id)
                  OR (q.s2_id IS NOT NULL AND q.s2_id = r.s2_id)
                  OR (q.scopus_id IS NOT NULL AND q.scopus_id = r.scopus_id)
                  OR (q.wos_id IS NOT NULL AND q.wos_id = r.wos_id)
                  OR (q.dimensions_id IS NOT NULL AND q.dimensions_id = r.dimensions_id)
                  OR (q.nacsos_id IS NOT NULL AND q.nacsos_id = r.nacsos_id)
             WHERE q.sources IS NOT NULL
               AND json_extract(q.sources, '$[0][0]') = ?1
             GROUP BY q.queue_id
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![source.as_str(), limit as i64], |row| {
                let entry = queue_entry_from_row(row)?;
                let priority: u8 = row.get("priority")?;
                let priority = SourcePriority::from_u8(priority).ok_or_else(|| {
                    conversion_error(12, format!("invalid priority {priority}"))
                })?;
                Ok(QueuedRequested {
                    entry,
                    priority,
                    num_has_request: row.get("num_has_request")?,
                    num_has_abstract: row.get("num_has_abstract")?,
                    num_has_title: row.get("num_has_title")?,
                    num_has_raw: row.get("num_has_raw")?,
                    num_has_source_request: row.get("num_has_source_request")?,
                    num_has_source_abstract: row.get("num_has_source_abstract")?,
                    num_has_source_title: row.get("num_has_source_title")?,
                    num_has_source_raw: row.get("num_has_source_raw")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Remove every occurrence of `source` from the given entries' source
    /// lists. Idempotent.
    pub fn drop_source_from_queued(&mut self, source: SourceTag, queue_ids: &[i64]) -> Result<()> {
        self.rewrite_sources(queue_ids, |list| {
            list.retain(|(tag, _)| *tag != source);
        })
    }

    /// Retain only FORCE-priority sources in the given entries' lists.
    /// Applied once an abstract has been found for the entry.
    pub fn drop_unforced_sources_from_queued(&mut self, queue_ids: &[i64]) -> Result<()> {
        self.rewrite_sources(queue_ids, |list| {
            list.retain(|(_, priority)| *priority == SourcePriority::Force);
        })
    }

    fn rewrite_sources(&mut self, queue_ids: &[i64], f: impl Fn(&mut SourceList)) -> Result<()> {
        if queue_ids.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let placeholders = placeholders(queue_ids.len());
            let mut select = tx.prepare(&format!(
                "SELECT queue_id, sources FROM queue
                 WHERE sources IS NOT NULL AND queue_id IN ({placeholders})"
            ))?;
            let mut update = tx.prepare("UPDATE queue SET sources = ?1 WHERE queue_id = ?2")?;

            let rows = select
                .query_map(params_from_iter(queue_ids.iter()), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            for (queue_id, sources_json) in rows {
                let mut list: SourceList = serde_json::from_str(&sources_json)
                    .with_context(|| format!("corrupt sources on queue entry {queue_id}"))?;
                f(&mut list);
                update.execute(params![serde_json::to_string(&list)?, queue_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete queue entries whose source list is empty.
    pub fn drop_finished_from_queue(&self) -> Result<usize> {
        let n = self
            .conn
            .execute("DELETE FROM queue WHERE sources = '[]'", [])?;
        Ok(n)
    }

    /// Delete specific queue entries.
    pub fn drop_queued(&self, queue_ids: &[i64]) -> Result<usize> {
        if queue_ids.is_empty() {
            return Ok(0);
        }
        let n = self.conn.execute(
            &format!(
                "DELETE FROM queue WHERE queue_id IN ({})",
                placeholders(queue_ids.len())
            ),
            params_from_iter(queue_ids.iter()),
        )?;
        Ok(n)
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Persist one provider response. Identifiers are canonicalised; `raw`
    /// is stored verbatim as received and never rewritten afterwards.
    pub fn insert_request(&self, request: &Request) -> Result<()> {
        let mut reference = request.reference.clone();
        reference.canonicalise();
        let raw = request
            .raw
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()?;
        self.conn
            .execute(
                "INSERT INTO request (record_id, wrapper, api_key_id, openalex_id, doi,
                                      pubmed_id, s2_id, scopus_id, wos_id, dimensions_id,
                                      nacsos_id, queue_id, title, abstract, raw, solarized,
                                      time_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    request.record_id,
                    request.wrapper.as_str(),
                    request.api_key_id,
                    reference.openalex_id,
                    reference.doi,
                    reference.pubmed_id,
                    reference.s2_id,
                    reference.scopus_id,
                    reference.wos_id,
                    reference.dimensions_id,
                    reference.nacsos_id,
                    request.queue_id,
                    request.title,
                    request.abstract_text,
                    raw,
                    request.solarized,
                    format_time(&request.time_created),
                ],
            )
            .context("failed to insert request")?;
        Ok(())
    }

    /// Newest complete request per `openalex_id` that has not been written
    /// to Solr yet.
    pub fn read_unsolarized_complete(&self, limit: usize) -> Result<Vec<Request>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_id, wrapper, api_key_id, openalex_id, doi, pubmed_id, s2_id,
                    scopus_id, wos_id, dimensions_id, nacsos_id, queue_id, title, abstract,
                    raw, solarized, MAX(time_created) AS time_created
             FROM request
             WHERE openalex_id IS NOT NULL
               AND abstract IS NOT NULL
               AND title IS NOT NULL
               AND solarized = 0
             GROUP BY openalex_id
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], request_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Distinct-by-`openalex_id` complete requests created after `from_time`.
    pub fn read_complete_records(
        &self,
        from_time: Option<DateTime<Utc>>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Request>> {
        let from = from_time.map(|t| format_time(&t)).unwrap_or_default();
        let mut stmt = self.conn.prepare(
            "SELECT record_id, wrapper, api_key_id, openalex_id, doi, pubmed_id, s2_id,
                    scopus_id, wos_id, dimensions_id, nacsos_id, queue_id, title, abstract,
                    raw, solarized, MAX(time_created) AS time_created
             FROM request
             WHERE openalex_id IS NOT NULL
               AND abstract IS NOT NULL
               AND title IS NOT NULL
               AND (?1 = '' OR time_created >= ?1)
             GROUP BY openalex_id
             ORDER BY openalex_id
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![from, limit as i64, offset as i64], request_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Flip `solarized` for every request row carrying one of the given
    /// `openalex_id`s. Deliberately not keyed on `record_id`: newer requests
    /// for the same work are marked along, avoiding repeat transfers.
    pub fn mark_solarized(&self, openalex_ids: &[String]) -> Result<usize> {
        if openalex_ids.is_empty() {
            return Ok(0);
        }
        let n = self.conn.execute(
            &format!(
                "UPDATE request SET solarized = 1 WHERE openalex_id IN ({})",
                placeholders(openalex_ids.len())
            ),
            params_from_iter(openalex_ids.iter()),
        )?;
        Ok(n)
    }

    /// OpenAlex IDs that are already queued or already have a completed
    /// request — used by gap detection to avoid duplicate seeding.
    pub fn known_openalex_ids(&self, ids: &[String]) -> Result<FxHashSet<String>> {
        if ids.is_empty() {
            return Ok(FxHashSet::default());
        }
        let ph = placeholders(ids.len());
        let mut stmt = self.conn.prepare(&format!(
            "SELECT openalex_id FROM request
             WHERE openalex_id IN ({ph}) AND abstract IS NOT NULL
             UNION
             SELECT openalex_id FROM queue WHERE openalex_id IN ({ph})"
        ))?;
        let both = ids.iter().chain(ids.iter());
        let rows = stmt
            .query_map(params_from_iter(both), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<FxHashSet<_>>>()?;
        Ok(rows)
    }

    /// Backlog counters for the status command.
    pub fn queue_stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats::default();
        let mut stmt = self.conn.prepare(
            "SELECT coalesce(json_extract(sources, '$[0][0]'), '(unassigned)') AS head,
                    count(1)
             FROM queue GROUP BY head ORDER BY head",
        )?;
        stats.queued_by_source = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        stats.queue_total = self
            .conn
            .query_row("SELECT count(1) FROM queue", [], |r| r.get(0))?;
        stats.request_total = self
            .conn
            .query_row("SELECT count(1) FROM request", [], |r| r.get(0))?;
        stats.request_with_abstract = self.conn.query_row(
            "SELECT count(1) FROM request WHERE abstract IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        stats.request_unsolarized = self.conn.query_row(
            "SELECT count(DISTINCT openalex_id) FROM request
             WHERE abstract IS NOT NULL AND title IS NOT NULL
               AND openalex_id IS NOT NULL AND solarized = 0",
            [],
            |r| r.get(0),
        )?;
        Ok(stats)
    }
}

/// Fill unknown identifiers of a yielded request from the originating queue
/// entries, matching on any already-known identifier. Also links the request
/// back to the first matching queue row. Heals cross-source ID linkage.
pub fn complete_ids(request: &mut Request, entries: &[QueueEntry]) {
    for entry in entries {
        if !request.reference.matches(&entry.reference) {
            continue;
        }
        for (field, value) in entry.reference.ids() {
            if request.reference.get(field).is_none() {
                request.reference.set(field, value.to_string());
            }
        }
        if request.queue_id.is_none() {
            request.queue_id = Some(entry.queue_id);
        }
    }
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn conversion_error(col: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        col,
        Type::Text,
        Box::new(std::io::Error::other(msg)),
    )
}

fn reference_from_row(row: &Row) -> rusqlite::Result<Reference> {
    Ok(Reference {
        openalex_id: row.get("openalex_id")?,
        doi: row.get("doi")?,
        pubmed_id: row.get("pubmed_id")?,
        s2_id: row.get("s2_id")?,
        scopus_id: row.get("scopus_id")?,
        wos_id: row.get("wos_id")?,
        dimensions_id: row.get("dimensions_id")?,
        nacsos_id: row.get("nacsos_id")?,
    })
}

fn queue_entry_from_row(row: &Row) -> rusqlite::Result<QueueEntry> {
    let sources_json: Option<String> = row.get("sources")?;
    let sources = sources_json
        .map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| conversion_error(9, format!("corrupt sources column: {e}")))
        })
        .transpose()?;
    let on_conflict: u8 = row.get("on_conflict")?;
    let on_conflict = OnConflict::from_u8(on_conflict)
        .ok_or_else(|| conversion_error(10, format!("invalid on_conflict {on_conflict}")))?;
    let time_created: String = row.get("time_created")?;
    Ok(QueueEntry {
        queue_id: row.get("queue_id")?,
        reference: reference_from_row(row)?,
        sources,
        on_conflict,
        time_created: parse_time(&time_created)
            .map_err(|e| conversion_error(11, format!("bad timestamp: {e}")))?,
    })
}

fn request_from_row(row: &Row) -> rusqlite::Result<Request> {
    let wrapper: String = row.get("wrapper")?;
    let wrapper = SourceTag::from_name(&wrapper)
        .ok_or_else(|| conversion_error(1, format!("unknown wrapper {wrapper}")))?;
    let raw_json: Option<String> = row.get("raw")?;
    let raw = raw_json
        .map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| conversion_error(14, format!("corrupt raw column: {e}")))
        })
        .transpose()?;
    let time_created: String = row.get("time_created")?;
    Ok(Request {
        record_id: row.get("record_id")?,
        wrapper,
        api_key_id: row.get("api_key_id")?,
        reference: reference_from_row(row)?,
        queue_id: row.get("queue_id")?,
        title: row.get("title")?,
        abstract_text: row.get("abstract")?,
        raw,
        solarized: row.get("solarized")?,
        time_created: parse_time(&time_created)
            .map_err(|e| conversion_error(16, format!("bad timestamp: {e}")))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(openalex_id: &str, doi: Option<&str>) -> QueueEntry {
        let mut e = QueueEntry::new(Reference {
            openalex_id: Some(openalex_id.to_string()),
            doi: doi.map(String::from),
            ..Default::default()
        });
        e.sources = Some(default_sources());
        e
    }

    fn request(wrapper: SourceTag, openalex_id: &str, abstract_text: Option<&str>) -> Request {
        let mut r = Request::new(
            wrapper,
            Reference {
                openalex_id: Some(openalex_id.to_string()),
                ..Default::default()
            },
        );
        r.title = Some("T".to_string());
        r.abstract_text = abstract_text.map(String::from);
        r.raw = Some(serde_json::json!({"id": openalex_id}));
        r
    }

    #[test]
    fn queue_and_fetch_by_head_source() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store.queue_requests(&[entry("W1", None), entry("W2", None)]).unwrap();

        let queued = store
            .get_queued_for_source(SourceTag::Dimensions, 10)
            .unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(
            queued[0].head_source(),
            Some((SourceTag::Dimensions, SourcePriority::Try))
        );

        // Nothing queued for Scopus at the head yet
        assert!(store
            .get_queued_for_source(SourceTag::Scopus, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn queue_ids_are_monotone() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store.queue_requests(&[entry("W1", None)]).unwrap();
        store.queue_requests(&[entry("W2", None)]).unwrap();
        let queued = store
            .get_queued_for_source(SourceTag::Dimensions, 10)
            .unwrap();
        assert!(queued[1].queue_id > queued[0].queue_id);
    }

    #[test]
    fn identifiers_canonicalised_at_write_boundary() {
        let mut store = CacheStore::open_in_memory().unwrap();
        let mut e = entry("https://openalex.org/W1", Some("https://doi.org/10.1/x"));
        e.sources = Some(default_sources());
        store.queue_requests(&[e]).unwrap();

        let queued = store
            .get_queued_for_source(SourceTag::Dimensions, 1)
            .unwrap();
        assert_eq!(queued[0].reference.openalex_id.as_deref(), Some("W1"));
        assert_eq!(queued[0].reference.doi.as_deref(), Some("10.1/x"));
    }

    #[test]
    fn default_sources_assigned_to_null_only() {
        let mut store = CacheStore::open_in_memory().unwrap();
        let mut bare = entry("W1", None);
        bare.sources = None;
        let mut explicit = entry("W2", None);
        explicit.sources = Some(vec![(SourceTag::Scopus, SourcePriority::Force)]);
        store.queue_requests(&[bare, explicit]).unwrap();

        assert_eq!(store.update_default_sources().unwrap(), 1);
        let dims = store
            .get_queued_for_source(SourceTag::Dimensions, 10)
            .unwrap();
        assert_eq!(dims.len(), 1);
        assert_eq!(dims[0].sources.as_ref().unwrap().len(), 4);
        let scopus = store.get_queued_for_source(SourceTag::Scopus, 10).unwrap();
        assert_eq!(
            scopus[0].head_source(),
            Some((SourceTag::Scopus, SourcePriority::Force))
        );
    }

    #[test]
    fn drop_source_advances_head() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store.queue_requests(&[entry("W1", None)]).unwrap();
        let id = store
            .get_queued_for_source(SourceTag::Dimensions, 1)
            .unwrap()[0]
            .queue_id;

        store
            .drop_source_from_queued(SourceTag::Dimensions, &[id])
            .unwrap();
        let queued = store.get_queued_for_source(SourceTag::Scopus, 1).unwrap();
        assert_eq!(queued[0].queue_id, id);
        assert_eq!(queued[0].sources.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn drop_source_is_idempotent() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store.queue_requests(&[entry("W1", None)]).unwrap();
        let id = store
            .get_queued_for_source(SourceTag::Dimensions, 1)
            .unwrap()[0]
            .queue_id;

        store
            .drop_source_from_queued(SourceTag::Dimensions, &[id])
            .unwrap();
        store
            .drop_source_from_queued(SourceTag::Dimensions, &[id])
            .unwrap();
        let queued = store.get_queued_for_source(SourceTag::Scopus, 1).unwrap();
        assert_eq!(queued[0].sources.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn drop_unforced_keeps_force_only() {
        let mut store = CacheStore::open_in_memory().unwrap();
        let mut e = entry("W1", None);
        e.sources = Some(vec![
            (SourceTag::Dimensions, SourcePriority::Try),
            (SourceTag::Scopus, SourcePriority::Force),
            (SourceTag::Wos, SourcePriority::Try),
        ]);
        store.queue_requests(&[e]).unwrap();
        let id = store
            .get_queued_for_source(SourceTag::Dimensions, 1)
            .unwrap()[0]
            .queue_id;

        store.drop_unforced_sources_from_queued(&[id]).unwrap();
        let queued = store.get_queued_for_source(SourceTag::Scopus, 1).unwrap();
        assert_eq!(
            queued[0].sources.as_ref().unwrap().as_slice(),
            &[(SourceTag::Scopus, SourcePriority::Force)]
        );
    }

    #[test]
    fn drop_finished_deletes_empty_lists() {
        let mut store = CacheStore::open_in_memory().unwrap();
        let mut e = entry("W1", None);
        e.sources = Some(vec![(SourceTag::Scopus, SourcePriority::Try)]);
        store.queue_requests(&[e]).unwrap();
        let id = store.get_queued_for_source(SourceTag::Scopus, 1).unwrap()[0].queue_id;

        assert_eq!(store.drop_finished_from_queue().unwrap(), 0);
        store
            .drop_source_from_queued(SourceTag::Scopus, &[id])
            .unwrap();
        assert_eq!(store.drop_finished_from_queue().unwrap(), 1);
        assert_eq!(store.queue_stats().unwrap().queue_total, 0);
    }

    #[test]
    fn aggregates_count_matching_requests() {
        let mut store = CacheStore::open_in_memory().unwrap();
        let mut e = entry("W1", Some("10.1/x"));
        e.sources = Some(vec![(SourceTag::Scopus, SourcePriority::Try)]);
        store.queue_requests(&[e]).unwrap();

        // one Scopus request without abstract, one Dimensions request with
        store
            .insert_request(&request(SourceTag::Scopus, "W1", None))
            .unwrap();
        store
            .insert_request(&request(SourceTag::Dimensions, "W1", Some("A long abstract")))
            .unwrap();

        let rows = store
            .get_queued_requested_for_source(SourceTag::Scopus, 10)
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.num_has_request, 2);
        assert_eq!(row.num_has_abstract, 1);
        assert_eq!(row.num_has_source_request, 1);
        assert_eq!(row.num_has_source_abstract, 0);
        assert_eq!(row.num_has_raw, 2);
        assert_eq!(row.num_has_source_raw, 1);
        assert_eq!(row.priority, SourcePriority::Try);
    }

    #[test]
    fn aggregates_zero_without_requests() {
        let mut store = CacheStore::open_in_memory().unwrap();
        let mut e = entry("W1", None);
        e.sources = Some(vec![(SourceTag::Scopus, SourcePriority::Try)]);
        store.queue_requests(&[e]).unwrap();

        let rows = store
            .get_queued_requested_for_source(SourceTag::Scopus, 10)
            .unwrap();
        assert_eq!(rows[0].num_has_request, 0);
        assert_eq!(rows[0].num_has_source_request, 0);
    }

    #[test]
    fn unsolarized_picks_newest_per_work() {
        let store = CacheStore::open_in_memory().unwrap();
        let mut old = request(SourceTag::Scopus, "W1", Some("old abstract"));
        old.time_created = Utc::now() - chrono::Duration::hours(1);
        store.insert_request(&old).unwrap();
        store
            .insert_request(&request(SourceTag::Dimensions, "W1", Some("new abstract")))
            .unwrap();
        // incomplete rows are excluded
        store
            .insert_request(&request(SourceTag::Wos, "W2", None))
            .unwrap();

        let batch = store.read_unsolarized_complete(10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].abstract_text.as_deref(), Some("new abstract"));
        assert_eq!(batch[0].wrapper, SourceTag::Dimensions);
    }

    #[test]
    fn mark_solarized_by_openalex_id_covers_all_rows() {
        let store = CacheStore::open_in_memory().unwrap();
        store
            .insert_request(&request(SourceTag::Scopus, "W1", Some("abstract one")))
            .unwrap();
        store
            .insert_request(&request(SourceTag::Dimensions, "W1", Some("abstract two")))
            .unwrap();

        assert_eq!(store.mark_solarized(&["W1".to_string()]).unwrap(), 2);
        assert!(store.read_unsolarized_complete(10).unwrap().is_empty());
    }

    #[test]
    fn read_complete_records_respects_from_time() {
        let store = CacheStore::open_in_memory().unwrap();
        let mut old = request(SourceTag::Scopus, "W1", Some("abstract"));
        old.time_created = Utc::now() - chrono::Duration::days(2);
        store.insert_request(&old).unwrap();
        store
            .insert_request(&request(SourceTag::Scopus, "W2", Some("abstract")))
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(1);
        let recent = store.read_complete_records(Some(cutoff), 10, 0).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].reference.openalex_id.as_deref(), Some("W2"));

        let all = store.read_complete_records(None, 10, 0).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn known_ids_from_queue_and_completed_requests() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store.queue_requests(&[entry("W1", None)]).unwrap();
        store
            .insert_request(&request(SourceTag::Scopus, "W2", Some("abstract")))
            .unwrap();
        // request without abstract does not count as known
        store
            .insert_request(&request(SourceTag::Scopus, "W3", None))
            .unwrap();

        let ids: Vec<String> = ["W1", "W2", "W3", "W4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let known = store.known_openalex_ids(&ids).unwrap();
        assert!(known.contains("W1"));
        assert!(known.contains("W2"));
        assert!(!known.contains("W3"));
        assert!(!known.contains("W4"));
    }

    #[test]
    fn raw_payload_roundtrips_verbatim() {
        let store = CacheStore::open_in_memory().unwrap();
        let payload = serde_json::json!({
            "eid": "2-s2.0-1",
            "dc:title": "T",
            "nested": {"a": [1, 2, 3]}
        });
        let mut req = request(SourceTag::Scopus, "W1", Some("long enough abstract"));
        req.raw = Some(payload.clone());
        store.insert_request(&req).unwrap();

        let read = store.read_unsolarized_complete(1).unwrap();
        assert_eq!(read[0].raw.as_ref().unwrap(), &payload);
    }

    #[test]
    fn complete_ids_fills_missing_from_matching_entry() {
        let mut entries = vec![entry("W1", Some("10.1/x"))];
        entries[0].queue_id = 7;
        entries[0].reference.pubmed_id = Some("99".to_string());

        let mut req = Request::new(
            SourceTag::Scopus,
            Reference {
                doi: Some("10.1/x".to_string()),
                scopus_id: Some("2-s2.0-1".to_string()),
                ..Default::default()
            },
        );
        complete_ids(&mut req, &entries);
        assert_eq!(req.reference.openalex_id.as_deref(), Some("W1"));
        assert_eq!(req.reference.pubmed_id.as_deref(), Some("99"));
        assert_eq!(req.reference.scopus_id.as_deref(), Some("2-s2.0-1"));
        assert_eq!(req.queue_id, Some(7));
    }

    #[test]
    fn complete_ids_ignores_non_matching_entry() {
        let entries = vec![entry("W1", Some("10.1/x"))];
        let mut req = Request::new(
            SourceTag::Scopus,
            Reference {
                doi: Some("10.9/other".to_string()),
                ..Default::default()
            },
        );
        complete_ids(&mut req, &entries);
        assert_eq!(req.reference.openalex_id, None);
        assert_eq!(req.queue_id, None);
    }

    #[test]
    fn queue_stats_counts() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store.queue_requests(&[entry("W1", None)]).unwrap();
        store
            .insert_request(&request(SourceTag::Scopus, "W2", Some("abstract")))
            .unwrap();

        let stats = store.queue_stats().unwrap();
        assert_eq!(stats.queue_total, 1);
        assert_eq!(stats.request_total, 1);
        assert_eq!(stats.request_with_abstract, 1);
        assert_eq!(stats.request_unsolarized, 1);
        assert_eq!(stats.queued_by_source[0].0, "DIMENSIONS");
    }

    #[test]
    fn open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let mut store = CacheStore::open(&path).unwrap();
            store.queue_requests(&[entry("W1", None)]).unwrap();
        }
        let store = CacheStore::open(&path).unwrap();
        assert_eq!(store.queue_stats().unwrap().queue_total, 1);
    }
}
