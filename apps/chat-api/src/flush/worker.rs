//! Flush worker pool: drains room buffers into durable storage.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time;

use crate::buffer::BufferStore;
use crate::durable::DurableStore;
use crate::error::ChatError;
use crate::models::message::DurableMessageRecord;

use super::backoff::BackoffConfig;
use super::scheduler::{FlushJob, FlushScheduler};

/// Outcome of a single flush job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job finished, appending this many records (0 for the empty-buffer
    /// no-op).
    Completed { appended: usize },
    /// The job failed after all retries. A drained batch, if any, was parked.
    FailedTerminal,
}

/// Fixed-size pool of workers consuming the flush queue.
///
/// Jobs for different rooms run in parallel up to the worker count; jobs for
/// one room are serialized by the scheduler's dedupe marker. Jobs beyond the
/// concurrency limit simply wait in the queue.
pub struct FlushWorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl FlushWorkerPool {
    pub fn spawn(
        worker_count: usize,
        jobs: mpsc::Receiver<FlushJob>,
        scheduler: Arc<FlushScheduler>,
        buffer: Arc<dyn BufferStore>,
        durable: Arc<dyn DurableStore>,
        backoff: BackoffConfig,
    ) -> Self {
        let jobs = Arc::new(Mutex::new(jobs));
        let handles = (0..worker_count)
            .map(|worker| {
                let jobs = jobs.clone();
                let scheduler = scheduler.clone();
                let buffer = buffer.clone();
                let durable = durable.clone();
                let backoff = backoff.clone();
                tokio::spawn(async move {
                    loop {
                        let job = { jobs.lock().await.recv().await };
                        let Some(job) = job else { break };
                        let outcome = run_flush_job(
                            &job,
                            scheduler.as_ref(),
                            buffer.as_ref(),
                            durable.as_ref(),
                            &backoff,
                        )
                        .await;
                        tracing::debug!(worker, room_id = %job.room_id, ?outcome, "flush job finished");
                    }
                    tracing::debug!(worker, "flush worker stopped");
                })
            })
            .collect();
        Self { handles }
    }

    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Execute one flush job.
///
/// The drain happens here, at execution time, so the job picks up everything
/// buffered since it was requested. The batch is drained exactly once; retry
/// attempts re-append the already-drained batch rather than re-draining, so
/// order is preserved and entries are never read twice.
pub async fn run_flush_job(
    job: &FlushJob,
    scheduler: &FlushScheduler,
    buffer: &dyn BufferStore,
    durable: &dyn DurableStore,
    backoff: &BackoffConfig,
) -> JobOutcome {
    let mut drained = None;
    let mut last_error: Option<ChatError> = None;

    for attempt in 0..=backoff.max_attempts {
        let delay = backoff.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tracing::debug!(
                room_id = %job.room_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying flush job"
            );
            time::sleep(delay).await;
        }

        if drained.is_none() {
            match buffer.drain_all(&job.room_id).await {
                Ok(entries) if entries.is_empty() => {
                    // Another job already drained everything; complete as a
                    // no-op with zero durable writes.
                    scheduler.complete(&job.room_id);
                    return JobOutcome::Completed { appended: 0 };
                }
                Ok(entries) => drained = Some(entries),
                Err(e) => {
                    tracing::warn!(room_id = %job.room_id, attempt, error = %e, "flush drain failed");
                    last_error = Some(e);
                    continue;
                }
            }
        }
        let Some(entries) = drained.as_ref() else {
            continue;
        };

        let records: Vec<DurableMessageRecord> =
            entries.iter().map(DurableMessageRecord::from).collect();
        match durable.append_batch(&job.room_id, &records).await {
            Ok(()) => {
                if attempt > 0 {
                    tracing::info!(room_id = %job.room_id, attempt, "flush recovered after retry");
                }
                scheduler.complete(&job.room_id);
                tracing::debug!(
                    room_id = %job.room_id,
                    appended = records.len(),
                    "flush appended batch"
                );
                return JobOutcome::Completed {
                    appended: records.len(),
                };
            }
            Err(e) => {
                tracing::warn!(
                    room_id = %job.room_id,
                    attempt,
                    max_attempts = backoff.max_attempts,
                    error = %e,
                    "durable append failed"
                );
                last_error = Some(e);
            }
        }
    }

    let error = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "all retries exhausted".to_string());
    match drained {
        // The batch was drained but could not be made durable: park it so it
        // is not lost, and release the room for future jobs.
        Some(entries) => scheduler.park(&job.room_id, entries, error),
        // Nothing was drained; the buffer is intact and the reconcile sweep
        // or the next send will schedule a fresh job.
        None => {
            tracing::error!(room_id = %job.room_id, %error, "flush drain exhausted retries");
            scheduler.complete(&job.room_id);
        }
    }
    JobOutcome::FailedTerminal
}
