//! Message ingestion: validation, live broadcast, and the buffering path.

use std::sync::Arc;

use chrono::Utc;
use tokio::time;

use crate::buffer::BufferStore;
use crate::error::ChatError;
use crate::flush::backoff::BackoffConfig;
use crate::flush::scheduler::FlushScheduler;
use crate::models::message::ChatMessage;
use crate::models::room::RoomId;

use super::events::EventName;
use super::fanout::RoomBroadcast;

/// Maximum accepted message text length.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Hands accepted messages to the broadcast hub and the buffering path.
///
/// The live broadcast happens on the caller's path; buffering and the flush
/// request run on a spawned task so a slow buffer store never delays
/// delivery to room members.
#[derive(Clone)]
pub struct MessageIngest {
    broadcast: Arc<RoomBroadcast>,
    buffer: Arc<dyn BufferStore>,
    scheduler: Arc<FlushScheduler>,
    append_backoff: BackoffConfig,
}

impl MessageIngest {
    pub fn new(
        broadcast: Arc<RoomBroadcast>,
        buffer: Arc<dyn BufferStore>,
        scheduler: Arc<FlushScheduler>,
        append_backoff: BackoffConfig,
    ) -> Self {
        Self {
            broadcast,
            buffer,
            scheduler,
            append_backoff,
        }
    }

    /// Validate message text. Rejected messages never enter the pipeline.
    pub fn validate(text: &str) -> Result<&str, ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::InvalidMessage(
                "message text is required".to_string(),
            ));
        }
        if trimmed.len() > MAX_MESSAGE_LEN {
            return Err(ChatError::InvalidMessage(format!(
                "message text must be {MAX_MESSAGE_LEN} characters or fewer"
            )));
        }
        Ok(trimmed)
    }

    /// Build a message with a server-assigned receipt timestamp.
    pub fn build_message(
        room_id: RoomId,
        sender_id: &str,
        sender_display_name: &str,
        text: &str,
    ) -> ChatMessage {
        ChatMessage {
            room_id,
            sender_id: sender_id.to_string(),
            sender_display_name: sender_display_name.to_string(),
            text: text.to_string(),
            sent_at: Utc::now(),
        }
    }

    /// Accept a message: broadcast it to the room's current members, then
    /// hand it to the buffering path without blocking the caller.
    pub fn accept(&self, message: ChatMessage) {
        self.broadcast.broadcast_to_room(
            message.room_id.clone(),
            EventName::MESSAGE_RECEIVED,
            serde_json::json!({
                "room_id": message.room_id,
                "sender_id": message.sender_id,
                "sender_display_name": message.sender_display_name,
                "text": message.text,
                "sent_at": message.sent_at,
            }),
        );

        let ingest = self.clone();
        tokio::spawn(async move {
            ingest.buffer_message(message).await;
        });
    }

    /// Append to the buffer with bounded backoff, then request a flush.
    ///
    /// Persistent failure is an observability event, not a client error —
    /// the live broadcast already happened.
    pub async fn buffer_message(&self, message: ChatMessage) {
        let room_id = message.room_id.clone();
        let mut appended = false;
        for attempt in 0..=self.append_backoff.max_attempts {
            let delay = self.append_backoff.delay_for_attempt(attempt);
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
            match self.buffer.append(&room_id, &message).await {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!(room_id = %room_id, attempt, "buffer append recovered after retry");
                    }
                    appended = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        room_id = %room_id,
                        attempt,
                        max_attempts = self.append_backoff.max_attempts,
                        error = %e,
                        "buffer append failed"
                    );
                }
            }
        }
        if !appended {
            tracing::error!(
                room_id = %room_id,
                sender_id = %message.sender_id,
                "message not buffered after exhausting retries"
            );
            return;
        }

        if let Err(e) = self.scheduler.request_flush(&room_id) {
            // The reconcile sweeper will pick the room up.
            tracing::warn!(room_id = %room_id, error = %e, "flush request failed");
        }
    }
}
