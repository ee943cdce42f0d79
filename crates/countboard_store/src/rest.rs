//! Managed key-value store reached over a REST API.
//!
//! Speaks the command-per-path dialect of hosted Redis-compatible stores:
//!
//! | operation | request | reply |
//! |-----------|---------|-------|
//! | get | `GET {base}/get/{key}` | `{"result": "<value>" \| null}` |
//! | set | `POST {base}/set/{key}` (body = value) | `{"result": "OK"}` |
//! | del | `POST {base}/del/{key}` | `{"result": 0 \| 1}` |
//!
//! Failures come back as `{"error": "..."}`. Requests carry the token as
//! a bearer credential.

use crate::backend::KvBackend;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Key-value backend on a managed REST store.
///
/// The store has no publish/subscribe, so it pairs with the
/// [`DisabledNotifier`](crate::DisabledNotifier) and clients poll.
#[derive(Clone)]
pub struct RestKv {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl RestKv {
    /// Creates a backend for the store at `url`.
    pub fn new(url: &str, token: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let base = Url::parse(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid store url {url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Unavailable(format!(
                "store url {url} cannot carry a path"
            )));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base,
            token: token.into(),
        })
    }

    fn endpoint(&self, command: &str, key: &str) -> StoreResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Unavailable("store url cannot carry a path".into()))?
            .pop_if_empty()
            .push(command)
            .push(key);
        Ok(url)
    }

    async fn call(&self, request: RequestBuilder) -> StoreResult<Value> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let reply: RestReply = response.json().await?;
        if let Some(error) = reply.error {
            return Err(StoreError::Unavailable(format!("{status}: {error}")));
        }
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!("store answered {status}")));
        }
        Ok(reply.result)
    }
}

#[async_trait]
impl KvBackend for RestKv {
    fn backend_tag(&self) -> &'static str {
        "rest"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let url = self.endpoint("get", key)?;
        match self.call(self.http.get(url)).await? {
            Value::Null => Ok(None),
            Value::String(value) => Ok(Some(value)),
            // Stores that decode JSON on their side hand back structured values.
            other => Ok(Some(other.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let url = self.endpoint("set", key)?;
        self.call(self.http.post(url).body(value.to_string()))
            .await
            .map(|_| ())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let url = self.endpoint("del", key)?;
        self.call(self.http.post(url)).await.map(|_| ())
    }
}
