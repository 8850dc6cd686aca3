//! CV upload. The server answers with a `cv_id`; storing it marks every
//! cached page built under another token as stale.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::coerce::{pick, text};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::storage::CacheStore;

/// Optional profile links sent alongside the document.
#[derive(Debug, Clone, Default)]
pub struct IngestLinks {
    pub linkedin_url: Option<String>,
    pub scholar_url: Option<String>,
    pub x_url: Option<String>,
}

impl IngestLinks {
    fn fields(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("linkedin_url", self.linkedin_url.as_deref()),
            ("scholar_url", self.scholar_url.as_deref()),
            ("x_url", self.x_url.as_deref()),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct IngestReceipt {
    pub cv_id: String,
}

impl From<Map<String, Value>> for IngestReceipt {
    fn from(m: Map<String, Value>) -> Self {
        IngestReceipt { cv_id: text(pick(&m, &["cv_id", "cvId", "id"])).trim().to_string() }
    }
}

pub struct Ingestor {
    client: Client,
    url: Url,
    cache: Arc<Mutex<CacheStore>>,
}

impl Ingestor {
    pub fn new(client: Client, api_base: &Url, cache: Arc<Mutex<CacheStore>>) -> Self {
        let mut url = api_base.clone();
        if let Ok(mut segs) = url.path_segments_mut() {
            segs.pop_if_empty().push("ingest").push("cv");
        }
        Self { client, url, cache }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Upload `path` and remember the returned token process-wide.
    pub async fn upload(&self, path: &Path, links: &IngestLinks) -> Result<IngestReceipt> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cv".to_string());
        let size = bytes.len();

        let mut form = Form::new().part("cv", Part::bytes(bytes).file_name(file_name.clone()));
        for (name, value) in links.fields() {
            if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
                form = form.text(name, v.to_string());
            }
        }

        let resp = self
            .client
            .post(self.url.clone())
            .multipart(form)
            .send()
            .await
            .context("ingest request")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            log(
                Level::Warn,
                Domain::Ingest,
                "upload_rejected",
                obj(&[("status", v_num(status.as_u16() as f64)), ("body", v_str(&body))]),
            );
            bail!("ingest failed with status {}: {}", status, body);
        }

        let receipt: IngestReceipt = resp.json().await.context("ingest response")?;
        if receipt.cv_id.is_empty() {
            return Err(anyhow!("ingest response carried no cv_id"));
        }
        self.remember(&receipt.cv_id)?;
        log(
            Level::Info,
            Domain::Ingest,
            "upload_ok",
            obj(&[
                ("file", v_str(&file_name)),
                ("bytes", v_num(size as f64)),
                ("cv_id", v_str(&receipt.cv_id)),
            ]),
        );
        Ok(receipt)
    }

    fn remember(&self, token: &str) -> Result<()> {
        let mut cache = self.cache.lock().map_err(|_| anyhow!("cache lock poisoned"))?;
        cache.set_ingest_token(token)
    }
}
