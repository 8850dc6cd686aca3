//! Local snapshot cache and the process-wide ingest token, in sqlite.
//!
//! Snapshots are keyed `<prefix>_<domain>` and remember the ingest token they
//! were built under; the token itself lives in `settings` under
//! `<prefix>_cv_id`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::logging::{log, obj, ts_now, v_str, Domain, Level};
use crate::state::fingerprint;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage {
    pub payload: Value,
    pub ingest_token: Option<String>,
    pub state_hash: String,
    pub saved_at: String,
}

pub struct CacheStore {
    conn: Connection,
    prefix: String,
}

impl CacheStore {
    pub fn open(path: &str, prefix: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("open cache {}", path))?;
        let mut store = Self { conn, prefix: prefix.to_string() };
        store.init()?;
        Ok(store)
    }

    pub fn in_memory(prefix: &str) -> Result<Self> {
        let mut store = Self { conn: Connection::open_in_memory()?, prefix: prefix.to_string() };
        store.init()?;
        Ok(store)
    }

    fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS page_cache (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                ingest_token TEXT,
                state_hash TEXT NOT NULL,
                saved_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn page_key(&self, domain: &str) -> String {
        format!("{}_{}", self.prefix, domain)
    }

    fn token_key(&self) -> String {
        format!("{}_cv_id", self.prefix)
    }

    pub fn load_page(&self, domain: &str) -> Result<Option<CachedPage>> {
        let row = self
            .conn
            .query_row(
                "SELECT payload, ingest_token, state_hash, saved_at FROM page_cache WHERE key = ?1",
                params![self.page_key(domain)],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, Option<String>>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((payload, ingest_token, state_hash, saved_at)) = row else {
            return Ok(None);
        };
        let payload = serde_json::from_str(&payload)
            .with_context(|| format!("cached snapshot for {} is not JSON", domain))?;
        Ok(Some(CachedPage { payload, ingest_token, state_hash, saved_at }))
    }

    /// Replace the snapshot for `domain`; returns its fingerprint.
    pub fn save_page(&mut self, domain: &str, payload: &Value, ingest_token: Option<&str>) -> Result<String> {
        let hash = fingerprint(payload);
        self.conn.execute(
            "INSERT INTO page_cache (key, payload, ingest_token, state_hash, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                ingest_token = excluded.ingest_token,
                state_hash = excluded.state_hash,
                saved_at = excluded.saved_at",
            params![self.page_key(domain), payload.to_string(), ingest_token, hash, ts_now()],
        )?;
        log(
            Level::Debug,
            Domain::Cache,
            "snapshot_saved",
            obj(&[("page", v_str(domain)), ("state_hash", v_str(&hash))]),
        );
        Ok(hash)
    }

    pub fn ingest_token(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![self.token_key()],
                |r| r.get::<_, String>(0),
            )
            .optional()?)
    }

    pub fn set_ingest_token(&mut self, token: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![self.token_key(), token],
        )?;
        log(
            Level::Info,
            Domain::Cache,
            "ingest_token_set",
            obj(&[("cv_id", v_str(token))]),
        );
        Ok(())
    }

    pub fn clear_ingest_token(&mut self) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", params![self.token_key()])?;
        Ok(())
    }

    /// Snapshot usable under the current ingest token.
    ///
    /// A snapshot built under a different token (or none, while a token is
    /// now set) is stale: a newer document was ingested since it was saved.
    pub fn fresh_page(&self, domain: &str) -> Result<Freshness> {
        let Some(page) = self.load_page(domain)? else {
            return Ok(Freshness::Missing);
        };
        let current = self.ingest_token()?;
        match current {
            Some(token) if page.ingest_token.as_deref() != Some(token.as_str()) => {
                Ok(Freshness::Stale { cached_token: page.ingest_token, current_token: token })
            }
            _ => Ok(Freshness::Fresh(page)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    Fresh(CachedPage),
    Stale { cached_token: Option<String>, current_token: String },
    Missing,
}
