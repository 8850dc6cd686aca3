use std::time::Duration;

use crate::metrics::DEFAULT_TOP_K;

#[derive(Clone, Debug)]
pub struct Config {
    /// Base of the REST surface, e.g. `http://127.0.0.1:3001/api`.
    pub api_base: String,
    /// Directory or http(s) base holding `<domain>.json` seed files.
    pub static_base: String,
    pub cache_path: String,
    /// Prefix for cache keys (`<prefix>_<domain>`) and the ingest token key.
    pub cache_prefix: String,
    pub fetch_timeout_ms: u64,
    pub top_k: usize,
    pub keyword_cap: usize,
    pub topic_cap: usize,
    pub persist_retries: u32,
    pub persist_base_delay_ms: u64,
    /// Append `?cv_id=<token>` to remote GETs when an ingest token is set.
    pub use_cv_query: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:3001/api".to_string(),
            static_base: "data".to_string(),
            cache_path: "./scholardash.sqlite".to_string(),
            cache_prefix: "galaxy".to_string(),
            fetch_timeout_ms: 8_000,
            top_k: DEFAULT_TOP_K,
            keyword_cap: 30,
            topic_cap: 12,
            persist_retries: 2,
            persist_base_delay_ms: 200,
            use_cv_query: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_base: std::env::var("API_BASE").unwrap_or(d.api_base),
            static_base: std::env::var("STATIC_BASE").unwrap_or(d.static_base),
            cache_path: std::env::var("CACHE_PATH").unwrap_or(d.cache_path),
            cache_prefix: std::env::var("CACHE_PREFIX").unwrap_or(d.cache_prefix),
            fetch_timeout_ms: std::env::var("FETCH_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.fetch_timeout_ms),
            top_k: std::env::var("TOP_K").ok().and_then(|v| v.parse().ok()).unwrap_or(d.top_k),
            keyword_cap: std::env::var("KEYWORD_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(d.keyword_cap),
            topic_cap: std::env::var("TOPIC_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(d.topic_cap),
            persist_retries: std::env::var("PERSIST_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.persist_retries),
            persist_base_delay_ms: std::env::var("PERSIST_BASE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.persist_base_delay_ms),
            use_cv_query: std::env::var("USE_CV_QUERY").map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(d.use_cv_query),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Derivation knobs handed to page derivations.
    pub fn limits(&self) -> Limits {
        Limits {
            top_k: self.top_k,
            keyword_cap: self.keyword_cap,
            topic_cap: self.topic_cap,
        }
    }
}

/// Caps and sizes used by derivations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub top_k: usize,
    pub keyword_cap: usize,
    pub topic_cap: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Config::default().limits()
    }
}
