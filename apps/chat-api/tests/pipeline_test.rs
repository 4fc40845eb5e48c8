//! End-to-end pipeline scenarios driven deterministically: flush jobs are
//! executed by hand instead of racing a live worker pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use chat_api::buffer::{BufferStore, MemoryBufferStore};
use chat_api::durable::MemoryDurableStore;
use chat_api::flush::backoff::BackoffConfig;
use chat_api::flush::scheduler::{FlushJob, FlushScheduler};
use chat_api::flush::worker::{run_flush_job, JobOutcome};
use chat_api::gateway::fanout::RoomBroadcast;
use chat_api::gateway::ingest::MessageIngest;
use chat_api::models::room::RoomId;

struct Pipeline {
    ingest: Arc<MessageIngest>,
    buffer: Arc<MemoryBufferStore>,
    durable: Arc<MemoryDurableStore>,
    scheduler: Arc<FlushScheduler>,
    jobs: tokio::sync::mpsc::Receiver<FlushJob>,
    backoff: BackoffConfig,
}

fn pipeline() -> Pipeline {
    let backoff = BackoffConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
        max_attempts: 3,
    };
    let buffer = Arc::new(MemoryBufferStore::new(Duration::from_secs(3600)));
    let durable = Arc::new(MemoryDurableStore::new());
    let (scheduler, jobs) = FlushScheduler::new(64);
    let ingest = Arc::new(MessageIngest::new(
        Arc::new(RoomBroadcast::new()),
        buffer.clone(),
        scheduler.clone(),
        backoff.clone(),
    ));
    Pipeline {
        ingest,
        buffer,
        durable,
        scheduler,
        jobs,
        backoff,
    }
}

impl Pipeline {
    async fn run_job(&self, job: &FlushJob) -> JobOutcome {
        run_flush_job(
            job,
            &self.scheduler,
            self.buffer.as_ref(),
            self.durable.as_ref(),
            &self.backoff,
        )
        .await
    }
}

#[tokio::test]
async fn burst_from_three_senders_lands_in_one_ordered_batch() {
    let mut pipeline = pipeline();
    let room = RoomId::from("trip_42");

    for (sender, text) in [("usr_maya", "hi"), ("usr_omar", "are we set?"), ("usr_lena", "yes!")] {
        let message = MessageIngest::build_message(room.clone(), sender, sender, text);
        pipeline.ingest.buffer_message(message).await;
    }

    // Three sends coalesced into exactly one job.
    let job = pipeline.jobs.try_recv().expect("one job scheduled");
    assert!(pipeline.jobs.try_recv().is_err());

    let outcome = pipeline.run_job(&job).await;
    assert_eq!(outcome, JobOutcome::Completed { appended: 3 });

    // Exactly one batch-append call, with the three records in send order.
    let batches = pipeline.durable.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].0, room);
    let texts: Vec<&str> = batches[0].1.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["hi", "are we set?", "yes!"]);
    let senders: Vec<&str> = batches[0].1.iter().map(|r| r.sender_id.as_str()).collect();
    assert_eq!(senders, vec!["usr_maya", "usr_omar", "usr_lena"]);
}

#[tokio::test]
async fn two_requests_before_any_worker_runs_make_one_job() {
    let mut pipeline = pipeline();
    let room = RoomId::from("trip_7");

    assert!(pipeline.scheduler.request_flush(&room).unwrap());
    time::sleep(Duration::from_millis(10)).await;
    assert!(!pipeline.scheduler.request_flush(&room).unwrap());

    assert_eq!(pipeline.jobs.try_recv().unwrap().room_id, room);
    assert!(pipeline.jobs.try_recv().is_err());
}

#[tokio::test]
async fn flush_against_an_empty_buffer_is_a_noop() {
    let mut pipeline = pipeline();
    let room = RoomId::from("trip_42");

    pipeline.scheduler.request_flush(&room).unwrap();
    let job = pipeline.jobs.try_recv().unwrap();

    let outcome = pipeline.run_job(&job).await;
    assert_eq!(outcome, JobOutcome::Completed { appended: 0 });
    assert!(pipeline.durable.batches().is_empty());

    // The room is free for the next cycle.
    assert!(!pipeline.scheduler.has_outstanding(&room));
}

#[tokio::test]
async fn order_is_preserved_across_flush_cycles() {
    let mut pipeline = pipeline();
    let room = RoomId::from("trip_42");

    for text in ["one", "two"] {
        let message = MessageIngest::build_message(room.clone(), "usr_maya", "Maya", text);
        pipeline.ingest.buffer_message(message).await;
    }
    let job = pipeline.jobs.try_recv().unwrap();
    pipeline.run_job(&job).await;

    let message = MessageIngest::build_message(room.clone(), "usr_maya", "Maya", "three");
    pipeline.ingest.buffer_message(message).await;
    let job = pipeline.jobs.try_recv().unwrap();
    pipeline.run_job(&job).await;

    let records = pipeline.durable.records_for(&room);
    let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
    assert_eq!(pipeline.durable.batches().len(), 2);
}

#[tokio::test]
async fn idle_room_buffer_expires_without_a_flush() {
    let buffer = MemoryBufferStore::new(Duration::from_millis(50));
    let room = RoomId::from("trip_42");

    let message = MessageIngest::build_message(room.clone(), "usr_maya", "Maya", "anyone?");
    buffer.append(&room, &message).await.unwrap();

    time::sleep(Duration::from_millis(80)).await;
    let removed = buffer.sweep_expired().await.unwrap();
    assert_eq!(removed, 1);

    // The buffer entry is gone; no flush job ever ran.
    assert!(buffer.drain_all(&room).await.unwrap().is_empty());
    assert!(buffer.pending_rooms().await.unwrap().is_empty());
}
