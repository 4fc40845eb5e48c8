//! Durable storage boundary for finalized messages.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ChatError;
use crate::models::message::DurableMessageRecord;
use crate::models::room::RoomId;

/// Append-only writer of finalized message records into long-term storage.
///
/// A successful return means the batch is durably recorded, with insertion
/// order preserved within the batch. A failed append surfaces as
/// `ChatError::FlushExecution` and is retried by the flush worker.
/// Implemented by the trip document store in production; the in-memory
/// version backs tests and local development.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn append_batch(
        &self,
        room_id: &RoomId,
        records: &[DurableMessageRecord],
    ) -> Result<(), ChatError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and single-process development)
// ---------------------------------------------------------------------------

pub struct MemoryDurableStore {
    batches: Mutex<Vec<(RoomId, Vec<DurableMessageRecord>)>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
        }
    }

    /// All batch appends, in call order.
    pub fn batches(&self) -> Vec<(RoomId, Vec<DurableMessageRecord>)> {
        self.batches.lock().clone()
    }

    /// All records appended for one room, batch boundaries flattened.
    pub fn records_for(&self, room_id: &RoomId) -> Vec<DurableMessageRecord> {
        self.batches
            .lock()
            .iter()
            .filter(|(room, _)| room == room_id)
            .flat_map(|(_, records)| records.iter().cloned())
            .collect()
    }
}

impl Default for MemoryDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn append_batch(
        &self,
        room_id: &RoomId,
        records: &[DurableMessageRecord],
    ) -> Result<(), ChatError> {
        self.batches
            .lock()
            .push((room_id.clone(), records.to_vec()));
        Ok(())
    }
}
