//! Credential pool
//!
//! Keys are selected by oldest `last_used` so that sibling processes sharing
//! the same pool drift toward fair utilisation without any coordination:
//! one `SELECT ... ORDER BY last_used LIMIT 1` plus a `last_used = now`
//! update after use stand in for a lock service.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Row};
use serde_json::Value;

use lacuna_core::model::{ApiKey, SourceTag};

use crate::store::CacheStore;

impl CacheStore {
    /// Select the active key authorised for `auth_key` and `source` with the
    /// oldest `last_used`. Returns `None` when the pool has nothing to offer
    /// (the caller maps that to a no-credentials failure).
    ///
    /// Scopus keys whose last quota feedback reported zero remaining
    /// requests are skipped.
    pub fn acquire_key(&self, auth_key: &str, source: SourceTag) -> Result<Option<ApiKey>> {
        let quota_clause = if source == SourceTag::Scopus {
            "AND (api_key.api_feedback IS NULL
                  OR json_extract(api_key.api_feedback, '$.remaining') IS NULL
                  OR CAST(json_extract(api_key.api_feedback, '$.remaining') AS INTEGER) > 0)"
        } else {
            ""
        };
        let sql = format!(
            "SELECT api_key.api_key_id, api_key.owner, api_key.wrapper, api_key.api_key,
                    api_key.proxy, api_key.active, api_key.last_used, api_key.api_feedback
             FROM api_key
                  JOIN m2m_auth_api_key ON api_key.api_key_id = m2m_auth_api_key.api_key_id
                  JOIN auth_key ON m2m_auth_api_key.auth_key_id = auth_key.auth_key_id
             WHERE auth_key.auth_key_id = ?1
               AND auth_key.active = 1
               AND api_key.active = 1
               AND api_key.wrapper = ?2
               {quota_clause}
             ORDER BY api_key.last_used
             LIMIT 1"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let key = stmt
            .query_map(params![auth_key, source.as_str()], api_key_from_row)?
            .next()
            .transpose()
            .context("failed to read api key row")?;
        Ok(key)
    }

    /// Stamp `last_used` and store provider quota feedback for a key,
    /// atomically after a response.
    pub fn record_key_use(&self, api_key_id: &str, api_feedback: Option<&Value>) -> Result<()> {
        let feedback = api_feedback.map(|v| v.to_string());
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let n = self.conn().execute(
            "UPDATE api_key
             SET last_used = ?1,
                 api_feedback = coalesce(?2, api_feedback)
             WHERE api_key_id = ?3",
            params![now, feedback, api_key_id],
        )?;
        if n == 0 {
            log::warn!("failed to log api key use for {api_key_id}");
        }
        Ok(())
    }

    /// Register a new API key. Returns its generated id.
    pub fn insert_api_key(
        &self,
        owner: Option<&str>,
        wrapper: SourceTag,
        api_key: &str,
        proxy: Option<&str>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn().execute(
            "INSERT INTO api_key (api_key_id, owner, wrapper, api_key, proxy, active)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![id, owner, wrapper.as_str(), api_key, proxy],
        )?;
        Ok(id)
    }

    /// Register a new auth (bearer) key. Returns its generated id.
    pub fn insert_auth_key(&self, note: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn().execute(
            "INSERT INTO auth_key (auth_key_id, note, active, can_read, can_write)
             VALUES (?1, ?2, 1, 1, 1)",
            params![id, note],
        )?;
        Ok(id)
    }

    /// Authorise `auth_key` to spend `api_key`.
    pub fn link_keys(&self, auth_key_id: &str, api_key_id: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO m2m_auth_api_key (api_key_id, auth_key_id) VALUES (?1, ?2)",
            params![api_key_id, auth_key_id],
        )?;
        Ok(())
    }

    /// All registered API keys, for the keys listing.
    pub fn list_api_keys(&self) -> Result<Vec<ApiKey>> {
        let mut stmt = self.conn().prepare(
            "SELECT api_key_id, owner, wrapper, api_key, proxy, active, last_used, api_feedback
             FROM api_key ORDER BY wrapper, last_used",
        )?;
        let keys = stmt
            .query_map([], api_key_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }
}

fn api_key_from_row(row: &Row) -> rusqlite::Result<ApiKey> {
    let wrapper: Option<String> = row.get("wrapper")?;
    let last_used: Option<String> = row.get("last_used")?;
    let feedback: Option<String> = row.get("api_feedback")?;
    Ok(ApiKey {
        api_key_id: row.get("api_key_id")?,
        owner: row.get("owner")?,
        wrapper: wrapper.and_then(|w| SourceTag::from_name(&w)),
        api_key: row.get("api_key")?,
        proxy: row.get("proxy")?,
        active: row.get("active")?,
        last_used: last_used
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)),
        api_feedback: feedback.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pool() -> (CacheStore, String) {
        let store = CacheStore::open_in_memory().unwrap();
        let auth = store.insert_auth_key("test user").unwrap();
        (store, auth)
    }

    #[test]
    fn acquire_requires_link() {
        let (store, auth) = pool();
        store
            .insert_api_key(Some("o"), SourceTag::Scopus, "k1", None)
            .unwrap();
        // key exists but is not linked to this auth key
        assert!(store.acquire_key(&auth, SourceTag::Scopus).unwrap().is_none());
    }

    #[test]
    fn acquire_picks_oldest_last_used() {
        let (store, auth) = pool();
        let k1 = store
            .insert_api_key(None, SourceTag::Scopus, "k1", None)
            .unwrap();
        let k2 = store
            .insert_api_key(None, SourceTag::Scopus, "k2", None)
            .unwrap();
        store.link_keys(&auth, &k1).unwrap();
        store.link_keys(&auth, &k2).unwrap();

        // Never-used keys come first; after using k1, k2 is preferred
        let first = store.acquire_key(&auth, SourceTag::Scopus).unwrap().unwrap();
        store.record_key_use(&first.api_key_id, None).unwrap();
        let second = store.acquire_key(&auth, SourceTag::Scopus).unwrap().unwrap();
        assert_ne!(first.api_key_id, second.api_key_id);

        store.record_key_use(&second.api_key_id, None).unwrap();
        // Now rotation comes back around to the first key
        let third = store.acquire_key(&auth, SourceTag::Scopus).unwrap().unwrap();
        assert_eq!(third.api_key_id, first.api_key_id);
    }

    #[test]
    fn acquire_filters_by_wrapper() {
        let (store, auth) = pool();
        let k = store
            .insert_api_key(None, SourceTag::Dimensions, "k", None)
            .unwrap();
        store.link_keys(&auth, &k).unwrap();

        assert!(store.acquire_key(&auth, SourceTag::Scopus).unwrap().is_none());
        assert!(store
            .acquire_key(&auth, SourceTag::Dimensions)
            .unwrap()
            .is_some());
    }

    #[test]
    fn scopus_quota_exhausted_key_skipped() {
        let (store, auth) = pool();
        let k = store
            .insert_api_key(None, SourceTag::Scopus, "k", None)
            .unwrap();
        store.link_keys(&auth, &k).unwrap();

        store
            .record_key_use(&k, Some(&json!({"remaining": 0, "limit": 20000})))
            .unwrap();
        assert!(store.acquire_key(&auth, SourceTag::Scopus).unwrap().is_none());

        store
            .record_key_use(&k, Some(&json!({"remaining": 3, "limit": 20000})))
            .unwrap();
        let key = store.acquire_key(&auth, SourceTag::Scopus).unwrap().unwrap();
        assert_eq!(key.api_feedback.unwrap()["remaining"], 3);
    }

    #[test]
    fn record_use_updates_feedback_and_last_used() {
        let (store, auth) = pool();
        let k = store
            .insert_api_key(None, SourceTag::Wos, "k", Some("http://proxy:8080"))
            .unwrap();
        store.link_keys(&auth, &k).unwrap();

        store
            .record_key_use(&k, Some(&json!({"remaining": 9})))
            .unwrap();
        let key = store.acquire_key(&auth, SourceTag::Wos).unwrap().unwrap();
        assert!(key.last_used.is_some());
        assert_eq!(key.proxy.as_deref(), Some("http://proxy:8080"));
        assert_eq!(key.api_feedback.unwrap()["remaining"], 9);

        // None feedback keeps the previous value
        store.record_key_use(&k, None).unwrap();
        let key = store.acquire_key(&auth, SourceTag::Wos).unwrap().unwrap();
        assert_eq!(key.api_feedback.unwrap()["remaining"], 9);
    }

    #[test]
    fn list_keys() {
        let (store, _auth) = pool();
        store
            .insert_api_key(Some("alice"), SourceTag::Scopus, "k1", None)
            .unwrap();
        store
            .insert_api_key(Some("bob"), SourceTag::Pubmed, "k2", None)
            .unwrap();
        let keys = store.list_api_keys().unwrap();
        assert_eq!(keys.len(), 2);
    }
}
