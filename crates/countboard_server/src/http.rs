//! HTTP surface of the gateway.

use crate::error::ServerError;
use crate::handler::RequestHandler;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use countboard_protocol::{
    ChangeEvent, FetchResponse, PollResponse, ResetResponse, SaveResponse, WireMessage,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{info, warn};
use uuid::Uuid;

/// Builds the router. Every route is also served under `/api`.
pub fn build_router(handler: RequestHandler) -> Router {
    let routes = Router::new()
        .route("/counters", get(fetch_counters).post(save_counters))
        .route("/events", get(stream_events))
        .route("/poll", get(poll_updates))
        .route("/reset", post(reset_counters));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .with_state(handler)
}

async fn fetch_counters(State(handler): State<RequestHandler>) -> Json<FetchResponse> {
    Json(handler.fetch().await)
}

async fn save_counters(
    State(handler): State<RequestHandler>,
    body: Bytes,
) -> Result<Json<SaveResponse>, ServerError> {
    handler.save(&body).await.map(Json)
}

#[derive(Debug, Deserialize)]
struct PollParams {
    #[serde(rename = "lastUpdateId")]
    last_update_id: Option<String>,
}

async fn poll_updates(
    State(handler): State<RequestHandler>,
    Query(params): Query<PollParams>,
) -> Json<PollResponse> {
    Json(handler.poll(params.last_update_id.as_deref()).await)
}

async fn reset_counters(
    State(handler): State<RequestHandler>,
) -> Result<Json<ResetResponse>, ServerError> {
    handler.reset().await.map(Json)
}

/// Logs the end of an event stream when the response body is dropped.
struct StreamGuard {
    connection_id: Uuid,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        info!(connection_id = %self.connection_id, "event stream closed");
    }
}

fn event_frame(event: &ChangeEvent) -> Option<Result<Event, Infallible>> {
    match event.encode() {
        Ok(json) => Some(Ok(Event::default().data(json))),
        Err(e) => {
            warn!(error = %e, "dropping unencodable change event");
            None
        }
    }
}

async fn stream_events(
    State(handler): State<RequestHandler>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let subscription = handler.subscribe().await?;
    let connection_id = Uuid::new_v4();
    info!(
        %connection_id,
        subscribers = handler.subscriber_count(),
        "event stream opened"
    );

    let keepalive = handler.keepalive_interval();
    let shutdown = handler.context().shutdown_signal();
    let guard = StreamGuard { connection_id };

    let connected = stream::once(async { Ok(Event::default().comment("connected")) });
    let changes = subscription.filter_map(move |event| {
        let _guard = &guard;
        futures::future::ready(event_frame(&event))
    });

    let stream = connected.chain(changes).take_until(shutdown);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(keepalive).text("keepalive")))
}
