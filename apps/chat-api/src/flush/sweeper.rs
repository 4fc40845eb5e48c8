//! Periodic reconciliation of the buffer store and the flush scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::buffer::BufferStore;

use super::scheduler::FlushScheduler;

/// Spawn the reconcile sweeper.
///
/// Every `interval` it drops buffers idle past their TTL, then requests a
/// flush for any room that still has pending entries and no outstanding job.
/// This is the fallback trigger for messages appended after a job's drain
/// and for flush requests lost to scheduler unavailability.
pub fn spawn(
    interval: Duration,
    buffer: Arc<dyn BufferStore>,
    scheduler: Arc<FlushScheduler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await; // First tick fires immediately; skip it.
        loop {
            ticker.tick().await;
            sweep(buffer.as_ref(), &scheduler).await;
        }
    })
}

async fn sweep(buffer: &dyn BufferStore, scheduler: &FlushScheduler) {
    match buffer.sweep_expired().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "expired idle room buffers"),
        Err(e) => tracing::warn!(error = %e, "buffer expiry sweep failed"),
    }

    let rooms = match buffer.pending_rooms().await {
        Ok(rooms) => rooms,
        Err(e) => {
            tracing::warn!(error = %e, "pending room scan failed");
            return;
        }
    };
    for room_id in rooms {
        if scheduler.has_outstanding(&room_id) {
            continue;
        }
        match scheduler.request_flush(&room_id) {
            Ok(true) => tracing::debug!(room_id = %room_id, "reconciled pending room"),
            Ok(false) => {}
            Err(e) => tracing::warn!(room_id = %room_id, error = %e, "reconcile flush request failed"),
        }
    }
}
