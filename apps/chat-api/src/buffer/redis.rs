//! Redis-backed buffer store.
//!
//! One list per room under `chat:buf:{room_id}`, with the key's expiry
//! refreshed on every append. Draining runs a Lua script so the read and the
//! delete happen in one indivisible step on the server.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::error::ChatError;
use crate::models::message::ChatMessage;
use crate::models::room::RoomId;

use super::BufferStore;

const BUFFER_KEY_PREFIX: &str = "chat:buf:";

/// Read the whole list and delete the key atomically. A failure anywhere in
/// the script leaves the list untouched, so nothing is lost mid-drain.
const DRAIN_SCRIPT: &str = r#"
local entries = redis.call('LRANGE', KEYS[1], 0, -1)
redis.call('DEL', KEYS[1])
return entries
"#;

pub struct RedisBufferStore {
    conn: ConnectionManager,
    drain: Script,
    idle_ttl_secs: i64,
}

impl RedisBufferStore {
    pub async fn connect(url: &str, idle_ttl_secs: u64) -> Result<Self, ChatError> {
        let client = redis::Client::open(url)
            .map_err(|e| ChatError::BufferUnavailable(format!("redis open: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| ChatError::BufferUnavailable(format!("redis connect: {e}")))?;
        Ok(Self {
            conn,
            drain: Script::new(DRAIN_SCRIPT),
            idle_ttl_secs: idle_ttl_secs as i64,
        })
    }

    fn key(room_id: &RoomId) -> String {
        format!("{BUFFER_KEY_PREFIX}{room_id}")
    }
}

#[async_trait]
impl BufferStore for RedisBufferStore {
    async fn append(&self, room_id: &RoomId, message: &ChatMessage) -> Result<(), ChatError> {
        let entry = serde_json::to_string(message)
            .map_err(|e| ChatError::BufferUnavailable(format!("serialization: {e}")))?;
        let key = Self::key(room_id);
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = redis::pipe()
            .atomic()
            .rpush(&key, &entry)
            .ignore()
            .expire(&key, self.idle_ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await;
        result.map_err(|e| {
            tracing::error!(?e, room_id = %room_id, "redis append failed");
            ChatError::BufferUnavailable(e.to_string())
        })
    }

    async fn drain_all(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, ChatError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = self
            .drain
            .key(Self::key(room_id))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(?e, room_id = %room_id, "redis drain failed");
                ChatError::BufferUnavailable(e.to_string())
            })?;
        let mut messages = Vec::with_capacity(raw.len());
        for entry in &raw {
            match serde_json::from_str(entry) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(room_id = %room_id, ?e, "skipping corrupt buffer entry");
                }
            }
        }
        Ok(messages)
    }

    async fn pending_rooms(&self) -> Result<Vec<RoomId>, ChatError> {
        let mut conn = self.conn.clone();
        let mut rooms = Vec::new();
        let mut iter: redis::AsyncIter<String> = conn
            .scan_match(format!("{BUFFER_KEY_PREFIX}*"))
            .await
            .map_err(|e| {
                tracing::error!(?e, "redis scan failed");
                ChatError::BufferUnavailable(e.to_string())
            })?;
        while let Some(key) = iter.next_item().await {
            rooms.push(RoomId::new(key.trim_start_matches(BUFFER_KEY_PREFIX)));
        }
        Ok(rooms)
    }

    async fn sweep_expired(&self) -> Result<usize, ChatError> {
        // Key expiry is native; Redis reclaims idle buffers on its own.
        Ok(0)
    }
}
