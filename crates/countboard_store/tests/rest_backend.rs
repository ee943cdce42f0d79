//! Managed REST backend against a fake store served over HTTP.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use countboard_protocol::{CounterSet, UpdateMarker, STORAGE_KEY};
use countboard_store::{CounterStore, KvBackend, RestKv, StoreError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "secret-token";

#[derive(Clone, Default)]
struct FakeStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {TOKEN}"))
        .unwrap_or(false)
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "WRONGPASS invalid token"})),
    )
}

async fn get_key(
    State(store): State<FakeStore>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let value = store.data.lock().get(&key).cloned();
    (StatusCode::OK, Json(json!({ "result": value })))
}

async fn set_key(
    State(store): State<FakeStore>,
    headers: HeaderMap,
    Path(key): Path<String>,
    body: String,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    store.data.lock().insert(key, body);
    (StatusCode::OK, Json(json!({"result": "OK"})))
}

async fn del_key(
    State(store): State<FakeStore>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    let removed = store.data.lock().remove(&key).is_some();
    (StatusCode::OK, Json(json!({"result": u8::from(removed)})))
}

async fn spawn_fake_store() -> (String, FakeStore) {
    let store = FakeStore::default();
    let app = Router::new()
        .route("/get/:key", get(get_key))
        .route("/set/:key", post(set_key))
        .route("/del/:key", post(del_key))
        .with_state(store.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), store)
}

#[tokio::test]
async fn get_set_del_round_trip() {
    let (url, fake) = spawn_fake_store().await;
    let kv = RestKv::new(&url, TOKEN, Duration::from_secs(2)).unwrap();

    assert_eq!(kv.get("k").await.unwrap(), None);
    kv.set("k", "value with spaces").await.unwrap();
    assert_eq!(
        kv.get("k").await.unwrap().as_deref(),
        Some("value with spaces")
    );
    assert!(fake.data.lock().contains_key("k"));

    kv.del("k").await.unwrap();
    assert_eq!(kv.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn rejected_token_is_unavailable() {
    let (url, _fake) = spawn_fake_store().await;
    let kv = RestKv::new(&url, "wrong", Duration::from_secs(2)).unwrap();

    let err = kv.get("k").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(ref msg) if msg.contains("WRONGPASS")));
}

#[tokio::test]
async fn counter_store_over_rest() {
    let (url, _fake) = spawn_fake_store().await;
    let kv = Arc::new(RestKv::new(&url, TOKEN, Duration::from_secs(2)).unwrap());
    let store = CounterStore::new(kv);

    let mut data = CounterSet::default_roster();
    data.apply_delta("Ara", 2).unwrap();
    store.store(&data, &UpdateMarker::new("m1")).await.unwrap();

    let state = store.load().await.unwrap();
    assert_eq!(state.data, data);
    assert_eq!(state.update_id, Some(UpdateMarker::new("m1")));

    let poll = store.check_for_update(Some("m0")).await;
    assert!(poll.has_update);

    let reset = store.reset().await.unwrap();
    assert_eq!(reset, CounterSet::reset_roster());
    assert_eq!(store.key(), STORAGE_KEY);
}

#[tokio::test]
async fn unreachable_store_degrades() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let kv = Arc::new(RestKv::new(&format!("http://{addr}"), TOKEN, Duration::from_secs(1)).unwrap());
    let store = CounterStore::new(kv);

    assert!(store.load().await.unwrap_err().is_unavailable());
    assert_eq!(store.read().await.data, CounterSet::default_roster());
    assert!(!store.check_for_update(None).await.has_update);
}
