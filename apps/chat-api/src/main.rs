use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_api::auth::MemoryTicketStore;
use chat_api::buffer::redis::RedisBufferStore;
use chat_api::buffer::{BufferStore, MemoryBufferStore};
use chat_api::config::Config;
use chat_api::durable::{DurableStore, MemoryDurableStore};
use chat_api::flush::backoff::BackoffConfig;
use chat_api::flush::scheduler::FlushScheduler;
use chat_api::flush::sweeper;
use chat_api::flush::worker::FlushWorkerPool;
use chat_api::gateway::fanout::RoomBroadcast;
use chat_api::gateway::ingest::MessageIngest;
use chat_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // Shared buffer store: Redis when configured, in-memory otherwise.
    let buffer: Arc<dyn BufferStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisBufferStore::connect(url, config.buffer_idle_ttl_secs)
                .await
                .expect("failed to connect to redis");
            tracing::info!("buffer store backed by redis");
            Arc::new(store)
        }
        None => {
            tracing::warn!("REDIS_URL not set — using in-memory buffer store (single process only)");
            Arc::new(MemoryBufferStore::new(Duration::from_secs(
                config.buffer_idle_ttl_secs,
            )))
        }
    };

    // In-memory durable store until the trip document-store writer is wired up.
    let durable: Arc<dyn DurableStore> = Arc::new(MemoryDurableStore::new());

    let (scheduler, jobs) = FlushScheduler::new(config.flush_queue_capacity);
    let flush_backoff = BackoffConfig {
        max_attempts: config.flush_max_attempts,
        ..BackoffConfig::default()
    };
    let _workers = FlushWorkerPool::spawn(
        config.flush_workers,
        jobs,
        scheduler.clone(),
        buffer.clone(),
        durable,
        flush_backoff,
    );
    let _sweeper = sweeper::spawn(
        Duration::from_secs(config.reconcile_interval_secs),
        buffer.clone(),
        scheduler.clone(),
    );

    let broadcast = Arc::new(RoomBroadcast::new());
    let append_backoff = BackoffConfig {
        max_attempts: config.append_max_attempts,
        ..BackoffConfig::default()
    };
    let ingest = Arc::new(MessageIngest::new(
        broadcast.clone(),
        buffer,
        scheduler,
        append_backoff,
    ));

    // In-memory ticket store until the account service verifier is wired up.
    let tickets = Arc::new(MemoryTicketStore::new());

    tracing::info!(workers = config.flush_workers, "chat-api configured");

    let state = AppState {
        config: Arc::new(config),
        tickets,
        broadcast,
        ingest,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(chat_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "chat-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
