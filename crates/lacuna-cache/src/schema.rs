//! SQLite schema and versioned migration

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema version, stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// Create or migrate the schema to the current version.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("failed to read schema version")?;

    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    if version < 1 {
        apply_schema_v1(conn)?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .context("failed to set schema version")?;
    log::debug!("schema migrated from v{version} to v{SCHEMA_VERSION}");
    Ok(())
}

fn apply_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS request (
            record_id     TEXT PRIMARY KEY,
            wrapper       TEXT NOT NULL,
            api_key_id    TEXT REFERENCES api_key (api_key_id),
            openalex_id   TEXT,
            doi           TEXT,
            pubmed_id     TEXT,
            s2_id         TEXT,
            scopus_id     TEXT,
            wos_id        TEXT,
            dimensions_id TEXT,
            nacsos_id     TEXT,
            queue_id      INTEGER,
            title         TEXT,
            abstract      TEXT,
            raw           TEXT,
            solarized     INTEGER NOT NULL DEFAULT 0,
            time_created  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_request_wrapper ON request (wrapper);
        CREATE INDEX IF NOT EXISTS ix_request_openalex_id ON request (openalex_id);
        CREATE INDEX IF NOT EXISTS ix_request_doi ON request (doi);
        CREATE INDEX IF NOT EXISTS ix_request_pubmed_id ON request (pubmed_id);
        CREATE INDEX IF NOT EXISTS ix_request_s2_id ON request (s2_id);
        CREATE INDEX IF NOT EXISTS ix_request_scopus_id ON request (scopus_id);
        CREATE INDEX IF NOT EXISTS ix_request_wos_id ON request (wos_id);
        CREATE INDEX IF NOT EXISTS ix_request_dimensions_id ON request (dimensions_id);
        CREATE INDEX IF NOT EXISTS ix_request_nacsos_id ON request (nacsos_id);
        CREATE INDEX IF NOT EXISTS ix_request_time_created ON request (time_created);

        CREATE TABLE IF NOT EXISTS queue (
            queue_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            openalex_id   TEXT,
            doi           TEXT,
            pubmed_id     TEXT,
            s2_id         TEXT,
            scopus_id     TEXT,
            wos_id        TEXT,
            dimensions_id TEXT,
            nacsos_id     TEXT,
            sources       TEXT,
            on_conflict   INTEGER NOT NULL DEFAULT 2,
            time_created  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_queue_openalex_id ON queue (openalex_id);
        CREATE INDEX IF NOT EXISTS ix_queue_doi ON queue (doi);

        CREATE TABLE IF NOT EXISTS api_key (
            api_key_id   TEXT PRIMARY KEY,
            owner        TEXT,
            wrapper      TEXT,
            api_key      TEXT NOT NULL,
            proxy        TEXT,
            active       INTEGER NOT NULL DEFAULT 1,
            last_used    TEXT,
            api_feedback TEXT
        );
        CREATE INDEX IF NOT EXISTS ix_api_key_wrapper ON api_key (wrapper);

        CREATE TABLE IF NOT EXISTS auth_key (
            auth_key_id TEXT PRIMARY KEY,
            note        TEXT NOT NULL,
            active      INTEGER NOT NULL DEFAULT 1,
            can_read    INTEGER NOT NULL DEFAULT 0,
            can_write   INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS m2m_auth_api_key (
            api_key_id  TEXT NOT NULL REFERENCES api_key (api_key_id),
            auth_key_id TEXT NOT NULL REFERENCES auth_key (auth_key_id),
            PRIMARY KEY (api_key_id, auth_key_id)
        );
        "#,
    )
    .context("failed to apply schema v1")?;
    Ok(())
}
