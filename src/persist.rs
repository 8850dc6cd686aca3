//! Best-effort write-back of page state through `POST <api>/page`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use crate::error::PersistError;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::retry::{retry_async, RetryConfig};

#[async_trait]
pub trait PersistSink: Send + Sync {
    async fn persist(&self, page: &str, data: &Value) -> Result<(), PersistError>;
}

pub struct PersistClient {
    client: Client,
    url: Url,
    retry: RetryConfig,
}

impl PersistClient {
    /// `api_base` is the REST root; the endpoint is `<api_base>/page`.
    pub fn new(client: Client, api_base: &Url, retry: RetryConfig) -> Self {
        let mut url = api_base.clone();
        if let Ok(mut segs) = url.path_segments_mut() {
            segs.pop_if_empty().push("page");
        }
        Self { client, url, retry }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post_once(&self, body: &Value) -> Result<(), PersistError> {
        let resp = self.client.post(self.url.clone()).json(body).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(PersistError::Status { status: status.as_u16(), body })
    }
}

#[async_trait]
impl PersistSink for PersistClient {
    async fn persist(&self, page: &str, data: &Value) -> Result<(), PersistError> {
        let body = json!({"page": page, "data": data});
        let op = format!("persist_{}", page);
        retry_async(&self.retry, &op, PersistError::is_retryable, || self.post_once(&body)).await?;
        log(
            Level::Debug,
            Domain::Persist,
            "page_posted",
            obj(&[("page", v_str(page)), ("bytes", v_num(body.to_string().len() as f64))]),
        );
        Ok(())
    }
}

/// Sink that accepts and drops everything. Used offline and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl PersistSink for NullSink {
    async fn persist(&self, _page: &str, _data: &Value) -> Result<(), PersistError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_page_under_api_base() {
        let base = Url::parse("http://127.0.0.1:3001/api").unwrap();
        let c = PersistClient::new(Client::new(), &base, RetryConfig::default());
        assert_eq!(c.url().as_str(), "http://127.0.0.1:3001/api/page");

        let slash = Url::parse("http://example.org/api/").unwrap();
        let c = PersistClient::new(Client::new(), &slash, RetryConfig::default());
        assert_eq!(c.url().as_str(), "http://example.org/api/page");
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error_not_a_panic() {
        let base = Url::parse("http://127.0.0.1:9/api").unwrap();
        let retry = RetryConfig { max_retries: 1, base_delay_ms: 1, max_delay_ms: 2, jitter_factor: 0.0 };
        let c = PersistClient::new(Client::new(), &base, retry);
        let err = c.persist("grants", &json!({"grants": []})).await.unwrap_err();
        assert!(matches!(err, PersistError::Transport(_)));
    }
}
