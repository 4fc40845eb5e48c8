use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::room::RoomId;

/// A chat message as it flows through the gateway and the buffer.
///
/// Immutable once constructed. `sent_at` is assigned by the gateway at
/// receipt time, not by the client, so entries within one room sort in
/// receipt order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub room_id: RoomId,
    pub sender_id: String,
    pub sender_display_name: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// The persisted form of a message, keyed by room and time.
///
/// Append-only; never mutated or deleted by this service. `(room_id,
/// sender_id, sent_at)` stays available as a natural dedupe key should the
/// durable boundary ever need one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableMessageRecord {
    pub room_id: RoomId,
    pub sender_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl From<&ChatMessage> for DurableMessageRecord {
    fn from(message: &ChatMessage) -> Self {
        Self {
            room_id: message.room_id.clone(),
            sender_id: message.sender_id.clone(),
            text: message.text.clone(),
            sent_at: message.sent_at,
        }
    }
}
