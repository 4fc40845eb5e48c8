use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

use chat_api::auth::{Identity, MemoryTicketStore};
use chat_api::buffer::MemoryBufferStore;
use chat_api::config::Config;
use chat_api::durable::MemoryDurableStore;
use chat_api::flush::backoff::BackoffConfig;
use chat_api::flush::scheduler::FlushScheduler;
use chat_api::flush::worker::FlushWorkerPool;
use chat_api::gateway::fanout::RoomBroadcast;
use chat_api::gateway::ingest::MessageIngest;
use chat_api::AppState;

pub type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Handles to the pipeline internals behind a test server.
pub struct TestHarness {
    pub state: AppState,
    pub tickets: Arc<MemoryTicketStore>,
    pub buffer: Arc<MemoryBufferStore>,
    pub durable: Arc<MemoryDurableStore>,
    pub scheduler: Arc<FlushScheduler>,
}

impl TestHarness {
    /// Issue a single-use gateway ticket for a test user.
    pub fn issue_ticket(&self, user_id: &str, display_name: &str) -> String {
        self.tickets.issue(Identity {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
        })
    }
}

pub fn test_config() -> Config {
    Config {
        port: 0,
        redis_url: None,
        flush_workers: 2,
        flush_queue_capacity: 64,
        flush_max_attempts: 3,
        append_max_attempts: 3,
        buffer_idle_ttl_secs: 3600,
        reconcile_interval_secs: 1,
    }
}

fn fast_backoff(max_attempts: u32) -> BackoffConfig {
    BackoffConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
        max_attempts,
    }
}

/// Build an `AppState` over in-memory stores with the worker pool running.
pub async fn test_harness() -> TestHarness {
    let config = test_config();
    let buffer = Arc::new(MemoryBufferStore::new(Duration::from_secs(
        config.buffer_idle_ttl_secs,
    )));
    let durable = Arc::new(MemoryDurableStore::new());
    let (scheduler, jobs) = FlushScheduler::new(config.flush_queue_capacity);
    let _pool = FlushWorkerPool::spawn(
        config.flush_workers,
        jobs,
        scheduler.clone(),
        buffer.clone(),
        durable.clone(),
        fast_backoff(config.flush_max_attempts),
    );

    let broadcast = Arc::new(RoomBroadcast::new());
    let ingest = Arc::new(MessageIngest::new(
        broadcast.clone(),
        buffer.clone(),
        scheduler.clone(),
        fast_backoff(config.append_max_attempts),
    ));
    let tickets = Arc::new(MemoryTicketStore::new());

    let state = AppState {
        config: Arc::new(config),
        tickets: tickets.clone(),
        broadcast,
        ingest,
    };

    TestHarness {
        state,
        tickets,
        buffer,
        durable,
        scheduler,
    }
}

/// Helper: start an actual TCP server for WebSocket testing.
/// Returns (addr, harness). The server runs in the background.
pub async fn start_ws_server() -> (SocketAddr, TestHarness) {
    let harness = test_harness().await;
    let app = chat_api::routes::router().with_state(harness.state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, harness)
}

/// Helper: connect to the gateway WebSocket and send IDENTIFY.
/// Returns the stream and the READY event.
pub async fn connect_and_identify(addr: SocketAddr, ticket: &str) -> (WsClient, serde_json::Value) {
    let url = format!("ws://{addr}/gateway");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    let identify = serde_json::json!({
        "op": 2,
        "d": { "ticket": ticket }
    });
    ws.send(tungstenite::Message::Text(identify.to_string().into()))
        .await
        .expect("send identify");

    let ready = recv_event(&mut ws).await;
    assert_eq!(ready["t"], "READY");
    (ws, ready)
}

/// Receive the next text frame as JSON, with a timeout.
pub async fn recv_event(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for gateway message")
            .expect("stream ended")
            .expect("ws error");
        if let tungstenite::Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("valid json");
        }
    }
}

/// Assert that no text frame arrives within the window.
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    if let Ok(Some(Ok(tungstenite::Message::Text(text)))) = time::timeout(window, ws.next()).await {
        panic!("expected no gateway message, got {text}");
    }
}

/// Join a room and consume the JOINED ack.
pub async fn join_room(ws: &mut WsClient, room_id: &str) {
    let join = serde_json::json!({
        "op": 3,
        "d": { "room_id": room_id }
    });
    ws.send(tungstenite::Message::Text(join.to_string().into()))
        .await
        .expect("send join");

    let ack = recv_event(ws).await;
    assert_eq!(ack["t"], "JOINED");
    assert_eq!(ack["d"]["room_id"], room_id);
}

/// Send a chat message into a room.
pub async fn send_text(ws: &mut WsClient, room_id: &str, text: &str) {
    let send = serde_json::json!({
        "op": 4,
        "d": { "room_id": room_id, "text": text }
    });
    ws.send(tungstenite::Message::Text(send.to_string().into()))
        .await
        .expect("send message");
}
