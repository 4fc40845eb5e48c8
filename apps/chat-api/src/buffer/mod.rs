//! Per-room buffering of messages between live broadcast and durable flush.

pub mod redis;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ChatError;
use crate::models::message::ChatMessage;
use crate::models::room::RoomId;

/// Abstraction over the fast shared store holding not-yet-durable messages.
///
/// Backed by Redis in production and an in-memory map in tests. One ordered
/// list per room; all mutation goes through `append` and `drain_all` — no
/// caller ever holds an external lock on a room's buffer.
#[async_trait]
pub trait BufferStore: Send + Sync {
    /// Append a message to the room's list and reset the room's idle expiry.
    async fn append(&self, room_id: &RoomId, message: &ChatMessage) -> Result<(), ChatError>;

    /// Atomically read the room's entire list and clear it.
    ///
    /// No other caller may observe a partial list or lose an entry that was
    /// not returned; a failure mid-operation leaves the list untouched.
    async fn drain_all(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, ChatError>;

    /// Rooms that currently have at least one buffered entry.
    async fn pending_rooms(&self) -> Result<Vec<RoomId>, ChatError>;

    /// Drop buffers that have been idle longer than the store's TTL.
    ///
    /// Returns the number of rooms removed. Stores with native key expiry
    /// return 0.
    async fn sweep_expired(&self) -> Result<usize, ChatError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and single-process development)
// ---------------------------------------------------------------------------

struct RoomBuffer {
    /// Serialized messages in append order.
    entries: Vec<String>,
    last_append: Instant,
}

pub struct MemoryBufferStore {
    rooms: Mutex<HashMap<RoomId, RoomBuffer>>,
    idle_ttl: Duration,
}

impl MemoryBufferStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }
}

#[async_trait]
impl BufferStore for MemoryBufferStore {
    async fn append(&self, room_id: &RoomId, message: &ChatMessage) -> Result<(), ChatError> {
        let entry = serde_json::to_string(message)
            .map_err(|e| ChatError::BufferUnavailable(format!("serialization: {e}")))?;
        let mut rooms = self.rooms.lock();
        let buffer = rooms.entry(room_id.clone()).or_insert_with(|| RoomBuffer {
            entries: Vec::new(),
            last_append: Instant::now(),
        });
        buffer.entries.push(entry);
        buffer.last_append = Instant::now();
        Ok(())
    }

    async fn drain_all(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, ChatError> {
        // Removing the room under the lock is the atomic read-and-clear: a
        // concurrent append either lands before the removal (and is returned
        // here) or creates a fresh buffer for the next drain.
        let drained = self.rooms.lock().remove(room_id);
        let entries = match drained {
            Some(buffer) => buffer.entries,
            None => return Ok(Vec::new()),
        };
        let mut messages = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_str(&entry) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(room_id = %room_id, ?e, "skipping corrupt buffer entry");
                }
            }
        }
        Ok(messages)
    }

    async fn pending_rooms(&self) -> Result<Vec<RoomId>, ChatError> {
        Ok(self
            .rooms
            .lock()
            .iter()
            .filter(|(_, buffer)| !buffer.entries.is_empty())
            .map(|(room_id, _)| room_id.clone())
            .collect())
    }

    async fn sweep_expired(&self) -> Result<usize, ChatError> {
        let now = Instant::now();
        let mut rooms = self.rooms.lock();
        let before = rooms.len();
        rooms.retain(|_, buffer| now.duration_since(buffer.last_append) < self.idle_ttl);
        Ok(before - rooms.len())
    }
}
