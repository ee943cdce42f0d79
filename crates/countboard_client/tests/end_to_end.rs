//! Client sessions talking to a real gateway.

use countboard_client::{
    ClientConfig, ClientSession, FileLocalStore, HttpTransport, LocalStore, MemoryLocalStore,
    TransportMode,
};
use countboard_protocol::{CounterSet, ResetResponse, STORAGE_KEY};
use countboard_server::{CounterServer, HandlerContext, ServerConfig};
use countboard_store::SyncBackend;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::time::timeout;

async fn start_gateway(backend: SyncBackend) -> (String, Arc<HandlerContext>) {
    let server = CounterServer::with_backend(ServerConfig::default(), backend);
    let context = server.context();
    let (listener, addr) = CounterServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    tokio::spawn(server.serve(listener, std::future::pending()));
    (format!("http://{addr}"), context)
}

fn client_config(base: &str) -> ClientConfig {
    ClientConfig::new(base)
        .with_poll_interval(Duration::from_millis(100))
        .with_subscribe_timeout(Duration::from_secs(1))
        .with_request_timeout(Duration::from_secs(2))
}

fn connect(base: &str) -> ClientSession<HttpTransport> {
    let config = client_config(base);
    let transport = HttpTransport::new(&config).unwrap();
    ClientSession::new(config, transport, MemoryLocalStore::new())
}

async fn wait_until<T: countboard_client::GatewayTransport>(
    session: &ClientSession<T>,
    check: impl Fn(&CounterSet) -> bool,
) {
    let mut rx = session.watch();
    timeout(Duration::from_secs(5), rx.wait_for(|c| check(c)))
        .await
        .expect("state never converged")
        .unwrap();
}

async fn wait_for_mode<T: countboard_client::GatewayTransport>(
    session: &ClientSession<T>,
    mode: TransportMode,
) {
    timeout(Duration::from_secs(5), async {
        while session.transport_mode() != mode {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("transport mode never reached");
}

#[tokio::test]
async fn two_clients_converge_over_push() {
    let (base, context) = start_gateway(SyncBackend::in_process(STORAGE_KEY)).await;

    let alice = connect(&base);
    let bob = connect(&base);
    alice.load().await.unwrap();
    bob.load().await.unwrap();
    alice.start().unwrap();
    bob.start().unwrap();
    wait_for_mode(&alice, TransportMode::Push).await;
    wait_for_mode(&bob, TransportMode::Push).await;
    assert_eq!(context.subscriber_count(), 2);

    alice.increment("Ara").await.unwrap();
    let after = alice.increment("Ara").await.unwrap();
    assert_eq!(after.count("Ara"), Some(2));

    wait_until(&bob, |c| c.count("Ara") == Some(2)).await;
    assert_eq!(bob.counters(), after);

    // Alice's own echoes never count as something she saw.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(alice.reconciler().last_seen().is_none());
    assert_eq!(alice.counters(), after);

    alice.close();
    bob.close();
    timeout(Duration::from_secs(5), async {
        while context.subscriber_count() != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriptions not released");
}

#[tokio::test]
async fn scenario_increment_fetch_reset() {
    let (base, _context) = start_gateway(SyncBackend::in_process(STORAGE_KEY)).await;

    let first = connect(&base);
    assert_eq!(first.load().await.unwrap(), CounterSet::default_roster());
    first.increment("Ara").await.unwrap();
    first.increment("Ara").await.unwrap();

    let second = connect(&base);
    let seen = second.load().await.unwrap();
    let expected: Vec<(&str, i64)> = vec![("Flo", 0), ("Ara", 2), ("Anto", 0), ("Isi", 0)];
    let actual: Vec<(&str, i64)> = seen.iter().map(|c| (c.name.as_str(), c.count)).collect();
    assert_eq!(actual, expected);
    assert_eq!(second.reconciler().last_seen(), first.reconciler().mine());

    let reset: ResetResponse = reqwest::Client::new()
        .post(format!("{base}/reset"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(reset.success);

    let third = connect(&base);
    let after_reset = third.load().await.unwrap();
    let names: Vec<&str> = after_reset.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Flo", "Ara", "Isi"]);
    assert!(after_reset.iter().all(|c| c.count == 0));
}

#[tokio::test]
async fn poll_only_gateway_still_converges() {
    let backend = SyncBackend::from_parts(
        countboard_store::BackendMode::Managed,
        Arc::new(countboard_store::InMemoryKv::new()),
        Arc::new(countboard_store::DisabledNotifier),
        STORAGE_KEY,
    );
    let (base, _context) = start_gateway(backend).await;

    let writer = connect(&base);
    let reader = connect(&base);
    writer.load().await.unwrap();
    reader.load().await.unwrap();
    reader.start().unwrap();
    wait_for_mode(&reader, TransportMode::Poll).await;

    writer.increment("Isi").await.unwrap();
    wait_until(&reader, |c| c.count("Isi") == Some(1)).await;
    assert_eq!(reader.transport_mode(), TransportMode::Poll);
}

#[tokio::test]
async fn local_only_gateway_uses_local_copy() {
    let (base, _context) = start_gateway(SyncBackend::local_only(STORAGE_KEY)).await;
    let dir = tempdir().unwrap();

    {
        let config = client_config(&base);
        let store = FileLocalStore::open(dir.path()).unwrap();
        let session = ClientSession::new(config.clone(), HttpTransport::new(&config).unwrap(), store);
        session.load().await.unwrap();
        session.increment("Flo").await.unwrap();
        session.increment("Flo").await.unwrap();
    }

    let store = FileLocalStore::open(dir.path()).unwrap();
    assert!(store.get_item(STORAGE_KEY).unwrap().is_some());

    let config = client_config(&base);
    let session = ClientSession::new(config.clone(), HttpTransport::new(&config).unwrap(), store);
    let counters = session.load().await.unwrap();
    assert_eq!(counters.count("Flo"), Some(2));

    session.start().unwrap();
    wait_for_mode(&session, TransportMode::Poll).await;
}

#[tokio::test]
async fn unreachable_gateway_falls_back_to_local_copy() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let local = MemoryLocalStore::new();
    let mut saved = CounterSet::default_roster();
    saved.apply_delta("Anto", 5).unwrap();
    local
        .set_item(STORAGE_KEY, &serde_json::to_string(&saved).unwrap())
        .unwrap();

    let config = client_config(&format!("http://{addr}"));
    let session = ClientSession::new(config.clone(), HttpTransport::new(&config).unwrap(), local);
    assert_eq!(session.load().await.unwrap(), saved);

    // Edits still apply locally while the gateway is down.
    let counters = session.increment("Anto").await.unwrap();
    assert_eq!(counters.count("Anto"), Some(6));
}

#[tokio::test]
async fn store_outage_keeps_local_copy() {
    let kv = Arc::new(countboard_store::InMemoryKv::new());
    let backend = SyncBackend::from_parts(
        countboard_store::BackendMode::InProcess,
        kv.clone(),
        Arc::new(countboard_store::MemoryNotifier::new()),
        STORAGE_KEY,
    );
    let (base, _context) = start_gateway(backend).await;
    kv.set_available(false);

    let dir = tempdir().unwrap();
    let store = FileLocalStore::open(dir.path()).unwrap();
    let mut saved = CounterSet::default_roster();
    saved.apply_delta("Anto", 5).unwrap();
    store
        .set_item(STORAGE_KEY, &serde_json::to_string(&saved).unwrap())
        .unwrap();

    let config = client_config(&base);
    let session = ClientSession::new(config.clone(), HttpTransport::new(&config).unwrap(), store);
    assert_eq!(session.load().await.unwrap(), saved);
    drop(session);

    let store = FileLocalStore::open(dir.path()).unwrap();
    let raw = store.get_item(STORAGE_KEY).unwrap().unwrap();
    let persisted: CounterSet = serde_json::from_str(&raw).unwrap();
    assert_eq!(persisted, saved);
}
