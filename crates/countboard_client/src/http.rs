//! HTTP transport implementation.
//!
//! Talks JSON to the gateway routes and reads the `/events` route as a
//! server-sent event stream.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::{EventStream, GatewayTransport};
use async_trait::async_trait;
use countboard_protocol::{
    ChangeEvent, FetchResponse, PollResponse, SaveRequest, SaveResponse, SseDecoder, SseFrame,
    UpdateMarker, WireMessage,
};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// HTTP-based gateway transport.
pub struct HttpTransport {
    /// Base URL of the gateway, without a trailing slash.
    base_url: String,
    http: reqwest::Client,
    request_timeout: Duration,
    last_error: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Creates a transport for the gateway named in `config`.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        // No client-wide timeout: it would also cut event streams.
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::transport_fatal(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            request_timeout: config.request_timeout,
            last_error: RwLock::new(None),
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn record<T>(&self, result: ClientResult<T>) -> ClientResult<T> {
        match &result {
            Ok(_) => *self.last_error.write() = None,
            Err(e) => *self.last_error.write() = Some(e.to_string()),
        }
        result
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let response = response.error_for_status()?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Protocol(e.to_string()))
    }
}

/// Turns an event-stream response into change events.
fn event_stream(response: Response) -> EventStream {
    struct Reader {
        response: Option<Response>,
        decoder: SseDecoder,
        pending: VecDeque<SseFrame>,
    }

    let reader = Reader {
        response: Some(response),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            match reader.pending.pop_front() {
                Some(SseFrame::Data(json)) => {
                    let event = ChangeEvent::decode(json.as_bytes()).map_err(ClientError::from);
                    return Some((event, reader));
                }
                Some(SseFrame::Comment(text)) => {
                    debug!(comment = %text, "event stream comment");
                    continue;
                }
                None => {}
            }

            let response = reader.response.as_mut()?;
            match response.chunk().await {
                Ok(Some(chunk)) => match reader.decoder.push(&chunk) {
                    Ok(frames) => reader.pending.extend(frames),
                    Err(e) => {
                        reader.response = None;
                        return Some((Err(e.into()), reader));
                    }
                },
                Ok(None) => return None,
                Err(e) => {
                    reader.response = None;
                    return Some((Err(e.into()), reader));
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl GatewayTransport for HttpTransport {
    async fn fetch(&self) -> ClientResult<FetchResponse> {
        let result: ClientResult<FetchResponse> = async {
            let response = self
                .http
                .get(self.url("/counters"))
                .timeout(self.request_timeout)
                .send()
                .await?;
            Self::read_json(response).await
        }
        .await;
        self.record(result)
    }

    async fn save(&self, request: &SaveRequest) -> ClientResult<SaveResponse> {
        let result: ClientResult<SaveResponse> = async {
            let body = request.encode()?;
            let response = self
                .http
                .post(self.url("/counters"))
                .header("content-type", "application/json")
                .body(body)
                .timeout(self.request_timeout)
                .send()
                .await?;
            Self::read_json(response).await
        }
        .await;
        self.record(result)
    }

    async fn subscribe(&self) -> ClientResult<EventStream> {
        let result: ClientResult<EventStream> = async {
            let response = self
                .http
                .get(self.url("/events"))
                .header("accept", "text/event-stream")
                .send()
                .await?;
            match response.status() {
                StatusCode::SERVICE_UNAVAILABLE => Err(ClientError::PushUnavailable),
                status if status.is_success() => Ok(event_stream(response)),
                status => Err(ClientError::transport_retryable(format!(
                    "subscribe failed with status {status}"
                ))),
            }
        }
        .await;
        self.record(result)
    }

    async fn poll(&self, last_update_id: Option<&UpdateMarker>) -> ClientResult<PollResponse> {
        let result: ClientResult<PollResponse> = async {
            let mut request = self
                .http
                .get(self.url("/poll"))
                .timeout(self.request_timeout);
            if let Some(marker) = last_update_id {
                request = request.query(&[("lastUpdateId", marker.as_str())]);
            }
            Self::read_json(request.send().await?).await
        }
        .await;
        self.record(result)
    }
}
