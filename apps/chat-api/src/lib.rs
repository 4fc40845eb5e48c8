pub mod auth;
pub mod buffer;
pub mod config;
pub mod durable;
pub mod error;
pub mod flush;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use auth::TicketVerifier;
use config::Config;
use gateway::fanout::RoomBroadcast;
use gateway::ingest::MessageIngest;

/// Shared application state available to all connection handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tickets: Arc<dyn TicketVerifier>,
    pub broadcast: Arc<RoomBroadcast>,
    pub ingest: Arc<MessageIngest>,
}
