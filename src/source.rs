//! Data sources and the declared extraction schema for each of them.
//!
//! A page lists its sources as [`SourceSpec`]s: where to fetch, how highly to
//! trust the answer (`rank`, lower wins) and which payload paths feed which
//! page fields. The resolver does the rest.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::error::SourceError;
use crate::state::is_empty_value;
use crate::storage::{CacheStore, Freshness};

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self) -> Result<Value, SourceError>;
    /// URL or path, for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Remote,
    Cache,
    Static,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Remote => "remote",
            SourceKind::Cache => "cache",
            SourceKind::Static => "static",
        }
    }
}

/// How one page field is pulled out of a payload.
#[derive(Clone, Copy)]
pub enum Extractor {
    /// `payload[key]`
    Key(&'static str),
    /// First present, non-empty `payload[key]` among alternatives.
    AnyKey(&'static [&'static str]),
    /// `payload[key]`, or the payload itself when it is a bare array.
    KeyOrBare(&'static str),
    /// `payload.items`, or the payload itself when it is a bare array.
    Items,
    /// The whole payload, when it is an object.
    Whole,
    /// RFC 6901 pointer into the payload.
    Pointer(&'static str),
    Custom(fn(&Value) -> Option<Value>),
}

impl Extractor {
    pub fn extract(&self, payload: &Value) -> Option<Value> {
        match self {
            Extractor::Key(k) => payload.get(*k).cloned(),
            Extractor::AnyKey(keys) => keys
                .iter()
                .filter_map(|k| payload.get(*k))
                .find(|v| !is_empty_value(v))
                .cloned(),
            Extractor::KeyOrBare(k) => match payload {
                Value::Array(_) => Some(payload.clone()),
                _ => payload.get(*k).cloned(),
            },
            Extractor::Items => match payload {
                Value::Array(_) => Some(payload.clone()),
                _ => payload.get("items").cloned(),
            },
            Extractor::Whole => payload.is_object().then(|| payload.clone()),
            Extractor::Pointer(p) => payload.pointer(p).cloned(),
            Extractor::Custom(f) => f(payload),
        }
    }
}

#[derive(Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub extractor: Extractor,
}

pub struct SourceSpec {
    pub label: String,
    pub kind: SourceKind,
    pub rank: u8,
    pub fetcher: Arc<dyn Fetch>,
    pub rules: Vec<FieldRule>,
}

impl SourceSpec {
    pub fn new(label: impl Into<String>, kind: SourceKind, rank: u8, fetcher: Arc<dyn Fetch>) -> Self {
        Self { label: label.into(), kind, rank, fetcher, rules: Vec::new() }
    }

    pub fn rule(mut self, field: &'static str, extractor: Extractor) -> Self {
        self.rules.push(FieldRule { field, extractor });
        self
    }

    /// `Key(field)` for every field, plus the override flags.
    pub fn mirror_fields(mut self, fields: &[&'static str]) -> Self {
        for &field in fields {
            self.rules.push(FieldRule { field, extractor: Extractor::Key(field) });
        }
        self.rule(OVERRIDES_FIELD, Extractor::Key(OVERRIDES_FIELD))
    }

    /// Whether this source serves the persisted page (sections plus
    /// override flags) rather than one computed view of it.
    pub fn carries_page_state(&self) -> bool {
        self.rules.iter().any(|r| r.field == OVERRIDES_FIELD)
    }

    /// Non-empty values this source offers for `field`, in rule order.
    pub fn candidates(&self, field: &str, payload: &Value) -> Vec<Value> {
        self.rules
            .iter()
            .filter(|r| r.field == field)
            .filter_map(|r| r.extractor.extract(payload))
            .filter(|v| !is_empty_value(v))
            .collect()
    }
}

pub const OVERRIDES_FIELD: &str = "overrides";

// =============================================================================
// Fetch implementations
// =============================================================================

pub struct HttpFetch {
    client: Client,
    url: Url,
}

impl HttpFetch {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn fetch(&self) -> Result<Value, SourceError> {
        let resp = self.client.get(self.url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!("{} -> {}", self.url, status.as_u16())));
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Malformed(e.to_string()))
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// Seed file read from disk or from a static web root.
pub enum StaticFetch {
    File(PathBuf),
    Http(HttpFetch),
}

#[async_trait]
impl Fetch for StaticFetch {
    async fn fetch(&self) -> Result<Value, SourceError> {
        match self {
            StaticFetch::File(path) => {
                let body = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| SourceError::Unavailable(format!("{}: {}", path.display(), e)))?;
                serde_json::from_str(&body).map_err(|e| SourceError::Malformed(e.to_string()))
            }
            StaticFetch::Http(inner) => inner.fetch().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            StaticFetch::File(path) => path.display().to_string(),
            StaticFetch::Http(inner) => inner.describe(),
        }
    }
}

/// Snapshot from the local cache; skipped when a newer document was ingested.
pub struct CacheFetch {
    store: Arc<Mutex<CacheStore>>,
    domain: String,
}

impl CacheFetch {
    pub fn new(store: Arc<Mutex<CacheStore>>, domain: &str) -> Self {
        Self { store, domain: domain.to_string() }
    }
}

#[async_trait]
impl Fetch for CacheFetch {
    async fn fetch(&self) -> Result<Value, SourceError> {
        let store = self
            .store
            .lock()
            .map_err(|_| SourceError::Unavailable("cache lock poisoned".to_string()))?;
        match store.fresh_page(&self.domain) {
            Ok(Freshness::Fresh(page)) => Ok(page.payload),
            Ok(Freshness::Stale { current_token, .. }) => Err(SourceError::Skipped(format!(
                "snapshot predates ingest {}",
                current_token
            ))),
            Ok(Freshness::Missing) => Err(SourceError::Unavailable("no snapshot".to_string())),
            Err(e) => Err(SourceError::Malformed(e.to_string())),
        }
    }

    fn describe(&self) -> String {
        format!("cache:{}", self.domain)
    }
}

// =============================================================================
// Endpoint catalog
// =============================================================================

/// Builds fetchers for the REST surface, static seeds and the cache.
#[derive(Clone)]
pub struct Endpoints {
    client: Client,
    api_base: Url,
    static_base: String,
    cache: Arc<Mutex<CacheStore>>,
    ingest_token: Option<String>,
}

impl Endpoints {
    pub fn new(
        client: Client,
        api_base: Url,
        static_base: &str,
        cache: Arc<Mutex<CacheStore>>,
        ingest_token: Option<String>,
    ) -> Self {
        Self {
            client,
            api_base,
            static_base: static_base.to_string(),
            cache,
            ingest_token,
        }
    }

    /// `<api_base>/<path>`, with `cv_id` when an ingest token is set.
    pub fn api_url(&self, path: &str) -> Url {
        let mut url = join_path(&self.api_base, path);
        if let Some(token) = &self.ingest_token {
            url.query_pairs_mut().append_pair("cv_id", token);
        }
        url
    }

    pub fn remote(&self, label: &str, rank: u8, path: &str) -> SourceSpec {
        let fetcher = Arc::new(HttpFetch::new(self.client.clone(), self.api_url(path)));
        SourceSpec::new(label, SourceKind::Remote, rank, fetcher)
    }

    pub fn static_file(&self, domain: &str, rank: u8) -> SourceSpec {
        let file = format!("{}.json", domain);
        let fetcher = match Url::parse(&self.static_base) {
            Ok(base) if matches!(base.scheme(), "http" | "https") => {
                StaticFetch::Http(HttpFetch::new(self.client.clone(), join_path(&base, &file)))
            }
            _ => StaticFetch::File(PathBuf::from(&self.static_base).join(file)),
        };
        SourceSpec::new("static", SourceKind::Static, rank, Arc::new(fetcher))
    }

    pub fn cache(&self, domain: &str, rank: u8) -> SourceSpec {
        let fetcher = Arc::new(CacheFetch::new(self.cache.clone(), domain));
        SourceSpec::new("cache", SourceKind::Cache, rank, fetcher)
    }
}

fn join_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segs) = url.path_segments_mut() {
        segs.pop_if_empty();
        segs.extend(path.split('/').filter(|s| !s.is_empty()));
    }
    url
}
