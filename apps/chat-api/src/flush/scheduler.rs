//! Flush job scheduling with per-room dedupe.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::ChatError;
use crate::models::message::ChatMessage;
use crate::models::room::RoomId;

/// Unit of work: drain one room's buffer into durable storage.
///
/// A job's identity is its room id, so a burst of requests for one room
/// collapses into a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushJob {
    pub room_id: RoomId,
}

/// A terminally failed flush, kept with its drained batch for operator
/// reconciliation. Never silently discarded.
#[derive(Debug, Clone)]
pub struct ParkedFlush {
    pub room_id: RoomId,
    pub entries: Vec<ChatMessage>,
    pub error: String,
}

/// Guarantees at most one outstanding flush job per room.
///
/// `outstanding` holds a marker per room from enqueue until the worker calls
/// `complete` or `park`, so concurrent `request_flush` calls for the same
/// room are absorbed into the existing job.
pub struct FlushScheduler {
    queue: mpsc::Sender<FlushJob>,
    outstanding: DashMap<RoomId, ()>,
    parked: DashMap<RoomId, ParkedFlush>,
}

impl FlushScheduler {
    /// Create the scheduler and the job queue consumed by the worker pool.
    pub fn new(queue_capacity: usize) -> (Arc<Self>, mpsc::Receiver<FlushJob>) {
        let (queue, jobs) = mpsc::channel(queue_capacity);
        (
            Arc::new(Self {
                queue,
                outstanding: DashMap::new(),
                parked: DashMap::new(),
            }),
            jobs,
        )
    }

    /// Request a flush for a room.
    ///
    /// A no-op if a job for the room is already queued or running — the
    /// existing job drains at execution time, so it picks up everything
    /// appended so far. Returns whether a new job was enqueued.
    pub fn request_flush(&self, room_id: &RoomId) -> Result<bool, ChatError> {
        if self.outstanding.insert(room_id.clone(), ()).is_some() {
            return Ok(false);
        }
        if let Err(e) = self.queue.try_send(FlushJob {
            room_id: room_id.clone(),
        }) {
            self.outstanding.remove(room_id);
            return Err(ChatError::SchedulerUnavailable(e.to_string()));
        }
        tracing::debug!(room_id = %room_id, "flush job enqueued");
        Ok(true)
    }

    /// Whether a job for the room is currently queued or running.
    pub fn has_outstanding(&self, room_id: &RoomId) -> bool {
        self.outstanding.contains_key(room_id)
    }

    /// Mark the room's job finished, allowing the next request to enqueue.
    pub fn complete(&self, room_id: &RoomId) {
        self.outstanding.remove(room_id);
    }

    /// Park a terminally failed flush.
    ///
    /// The drained batch is retained for manual reconciliation and the room
    /// is released, so future flush requests are not blocked.
    pub fn park(&self, room_id: &RoomId, entries: Vec<ChatMessage>, error: String) {
        tracing::error!(
            room_id = %room_id,
            entries = entries.len(),
            %error,
            "flush parked after exhausting retries"
        );
        self.parked.insert(
            room_id.clone(),
            ParkedFlush {
                room_id: room_id.clone(),
                entries,
                error,
            },
        );
        self.outstanding.remove(room_id);
    }

    /// Take a parked flush for manual reconciliation.
    pub fn take_parked(&self, room_id: &RoomId) -> Option<ParkedFlush> {
        self.parked.remove(room_id).map(|(_, parked)| parked)
    }

    /// Rooms with a parked flush awaiting operator attention.
    pub fn parked_rooms(&self) -> Vec<RoomId> {
        self.parked.iter().map(|entry| entry.key().clone()).collect()
    }
}
