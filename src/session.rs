//! One page's lifecycle: resolve, cache, edit, commit.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context as _, Result};
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::config::Config;
use crate::error::EditError;
use crate::ingest::{IngestLinks, IngestReceipt, Ingestor};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::pages::Page;
use crate::persist::{PersistClient, PersistSink};
use crate::render::DisplayModel;
use crate::resolver::{resolve, Origin};
use crate::retry::RetryConfig;
use crate::source::{Endpoints, SourceSpec};
use crate::state::PageState;
use crate::storage::CacheStore;
use crate::store::{CommitOutcome, Store};

/// Process-wide handles shared by every page: HTTP client, cache, sink.
pub struct Context {
    pub config: Config,
    client: Client,
    api_base: Url,
    cache: Arc<Mutex<CacheStore>>,
    sink: Arc<dyn PersistSink>,
}

impl Context {
    pub fn from_config(config: Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .context("build http client")?;
        let api_base = Url::parse(&config.api_base).with_context(|| format!("API_BASE {}", config.api_base))?;
        let cache = CacheStore::open(&config.cache_path, &config.cache_prefix)?;
        let retry = RetryConfig {
            max_retries: config.persist_retries,
            base_delay_ms: config.persist_base_delay_ms,
            ..RetryConfig::default()
        };
        let sink = Arc::new(PersistClient::new(client.clone(), &api_base, retry));
        Ok(Self { config, client, api_base, cache: Arc::new(Mutex::new(cache)), sink })
    }

    /// Assemble from prepared parts; the sink and cache are caller-owned.
    pub fn with_parts(config: Config, cache: CacheStore, sink: Arc<dyn PersistSink>) -> Result<Self> {
        let api_base = Url::parse(&config.api_base).with_context(|| format!("API_BASE {}", config.api_base))?;
        Ok(Self {
            client: Client::new(),
            config,
            api_base,
            cache: Arc::new(Mutex::new(cache)),
            sink,
        })
    }

    pub fn cache(&self) -> Arc<Mutex<CacheStore>> {
        self.cache.clone()
    }

    fn lock_cache(&self) -> Result<MutexGuard<'_, CacheStore>> {
        self.cache.lock().map_err(|_| anyhow!("cache lock poisoned"))
    }

    pub fn ingest_token(&self) -> Result<Option<String>> {
        self.lock_cache()?.ingest_token()
    }

    pub fn clear_ingest_token(&self) -> Result<()> {
        self.lock_cache()?.clear_ingest_token()
    }

    pub fn endpoints(&self) -> Result<Endpoints> {
        let token = if self.config.use_cv_query { self.ingest_token()? } else { None };
        Ok(Endpoints::new(
            self.client.clone(),
            self.api_base.clone(),
            &self.config.static_base,
            self.cache.clone(),
            token,
        ))
    }

    pub async fn ingest(&self, path: &Path, links: &IngestLinks) -> Result<IngestReceipt> {
        Ingestor::new(self.client.clone(), &self.api_base, self.cache.clone())
            .upload(path, links)
            .await
    }

    /// Snapshot `state` for instant reload, tagged with the current token.
    /// Failures are logged; the cache is a convenience.
    fn snapshot(&self, domain: &str, state: &Value) {
        let result = self.lock_cache().and_then(|mut cache| {
            let token = cache.ingest_token()?;
            cache.save_page(domain, state, token.as_deref())
        });
        if let Err(e) = result {
            log(
                Level::Warn,
                Domain::Cache,
                "snapshot_failed",
                obj(&[("page", v_str(domain)), ("error", v_str(&e.to_string()))]),
            );
        }
    }
}

pub struct Session<'a, P: Page> {
    ctx: &'a Context,
    store: Store<P>,
    provenance: BTreeMap<&'static str, Origin>,
}

impl<'a, P: Page> Session<'a, P> {
    /// Resolve `page` from its declared sources.
    pub async fn load(ctx: &'a Context, page: P) -> Result<Self> {
        let sources = page.sources(&ctx.endpoints()?);
        Ok(Self::load_from(ctx, page, sources).await)
    }

    /// Resolve `page` from an explicit source list.
    pub async fn load_from(ctx: &'a Context, page: P, sources: Vec<SourceSpec>) -> Self {
        let resolution = resolve(&page, sources, ctx.config.fetch_timeout()).await;
        ctx.snapshot(P::DOMAIN, &resolution.state.to_value());

        let contributing: Vec<&str> = resolution.contributing_sources().into_iter().collect();
        log(
            Level::Info,
            Domain::Resolve,
            "page_loaded",
            obj(&[
                ("page", v_str(P::DOMAIN)),
                ("sources", Value::from(contributing)),
                ("state_hash", v_str(&resolution.state.fingerprint())),
            ]),
        );
        Self { ctx, store: Store::new(page, resolution.state), provenance: resolution.provenance }
    }

    pub fn state(&self) -> &PageState<P::Sections> {
        self.store.state()
    }

    pub fn store(&self) -> &Store<P> {
        &self.store
    }

    pub fn provenance(&self) -> &BTreeMap<&'static str, Origin> {
        &self.provenance
    }

    pub fn display(&self) -> DisplayModel {
        self.store.page().project(self.store.state())
    }

    pub fn apply_edit(&mut self, section: &str, value: Value, manual: bool) -> Result<(), EditError> {
        self.store.apply_edit(section, value, manual)
    }

    pub fn set_manual(&mut self, section: &str, manual: bool) -> Result<(), EditError> {
        self.store.set_manual(section, manual)
    }

    pub fn mutate<F>(&mut self, collection: &str, f: F) -> Result<(), EditError>
    where
        F: FnOnce(&mut P::Sections),
    {
        self.store.mutate(collection, f)
    }

    /// Snapshot locally, then write back. The local edit stands either way.
    pub async fn commit(&self) -> CommitOutcome {
        self.ctx.snapshot(P::DOMAIN, &self.store.state().to_value());
        self.store.commit(self.ctx.sink.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::pages::GrantsPage;
    use crate::persist::NullSink;
    use serde_json::json;

    fn offline(dir: &Path) -> Context {
        let config = Config {
            api_base: "http://127.0.0.1:9/api".into(),
            static_base: dir.display().to_string(),
            fetch_timeout_ms: 500,
            ..Config::default()
        };
        Context::with_parts(config, CacheStore::in_memory("t").unwrap(), Arc::new(NullSink)).unwrap()
    }

    #[tokio::test]
    async fn load_snapshots_and_commit_refreshes_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("grants.json"),
            json!({"grants": [{"title": "A", "agency": "NSF", "amountAwarded": 10}]}).to_string(),
        )
        .unwrap();
        let ctx = offline(dir.path());
        let mut session = Session::load(&ctx, GrantsPage::new(Limits::default())).await.unwrap();
        assert_eq!(session.state().sections.totals.total_awarded, 10.0);
        assert!(ctx.cache().lock().unwrap().load_page("grants").unwrap().is_some());

        session.apply_edit("totals", json!({"totalAwarded": 999}), true).unwrap();
        assert!(session.commit().await.is_persisted());
        let cached = ctx.cache().lock().unwrap().load_page("grants").unwrap().unwrap();
        assert_eq!(cached.payload["totals"]["totalAwarded"], json!(999.0));
        assert_eq!(cached.payload["overrides"]["totals"], json!(true));
    }

    #[test]
    fn endpoints_carry_token_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = offline(dir.path());
        ctx.cache().lock().unwrap().set_ingest_token("cv-7").unwrap();
        assert!(ctx.endpoints().unwrap().api_url("grants").as_str().ends_with("grants?cv_id=cv-7"));
        ctx.config.use_cv_query = false;
        assert!(ctx.endpoints().unwrap().api_url("grants").as_str().ends_with("/api/grants"));
    }
}
