use std::collections::{BTreeMap, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use tokio::sync::mpsc;

use super::*;
use crate::db::models::Delegation;
use crate::tzkt::{DelegationsRequest, FeedError, Sender, TzktDelegation};

// ==================== FAKES ====================

/// In-memory TzKT: serves stored delegations by `id.gt` cursor and limit.
#[derive(Default)]
struct FakeFeed {
    state: Mutex<FeedState>,
}

#[derive(Default)]
struct FeedState {
    delegations: BTreeMap<i64, TzktDelegation>,
    calls: usize,
    failing_calls: HashSet<usize>,
    requests: Vec<DelegationsRequest>,
    /// Pages returned verbatim, in order, before falling back to `delegations`
    scripted_pages: VecDeque<Vec<TzktDelegation>>,
    /// Moved forward by `step` during every fetch
    clock: Option<(ManualClock, Duration)>,
}

impl FakeFeed {
    fn with_ids(ids: impl IntoIterator<Item = i64>) -> Arc<Self> {
        let feed = Self::default();
        for id in ids {
            feed.push(id);
        }
        Arc::new(feed)
    }

    fn push(&self, id: i64) {
        self.state
            .lock()
            .unwrap()
            .delegations
            .insert(id, tzkt_delegation(id));
    }

    /// Make the n-th call (1-based) fail with a 503.
    fn fail_on_call(&self, call: usize) {
        self.state.lock().unwrap().failing_calls.insert(call);
    }

    /// Serve `ids` as the next page exactly as given, ordered or not.
    fn script_page(&self, ids: &[i64]) {
        self.state
            .lock()
            .unwrap()
            .scripted_pages
            .push_back(ids.iter().copied().map(tzkt_delegation).collect());
    }

    /// Advance `clock` by `step` while each fetch is in flight.
    fn advance_clock_on_fetch(&self, clock: &ManualClock, step: Duration) {
        self.state.lock().unwrap().clock = Some((clock.clone(), step));
    }

    fn requests(&self) -> Vec<DelegationsRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl DelegationFeed for FakeFeed {
    async fn get_delegations(
        &self,
        request: DelegationsRequest,
    ) -> Result<Vec<TzktDelegation>, FeedError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        state.requests.push(request.clone());

        if let Some((clock, step)) = &state.clock {
            clock.advance(*step);
        }

        if state.failing_calls.contains(&state.calls) {
            return Err(FeedError::UnexpectedStatus(StatusCode::SERVICE_UNAVAILABLE));
        }
        if let Some(page) = state.scripted_pages.pop_front() {
            return Ok(page);
        }

        let lower = request
            .id_greater_than
            .map_or(Bound::Unbounded, Bound::Excluded);

        Ok(state
            .delegations
            .range((lower, Bound::Unbounded))
            .take(request.limit as usize)
            .map(|(_, d)| d.clone())
            .collect())
    }
}

/// In-memory store with the same duplicate and checkpoint rules as Postgres.
#[derive(Default)]
struct MemoryStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    checkpoint: i64,
    saved: BTreeMap<i64, Delegation>,
    batches: Vec<Vec<i64>>,
    fail_checkpoint_reads: bool,
    fail_saves: bool,
    fail_next_save: bool,
}

impl MemoryStore {
    fn with_checkpoint(checkpoint: i64) -> Arc<Self> {
        let store = Self::default();
        store.state.lock().unwrap().checkpoint = checkpoint;
        Arc::new(store)
    }

    fn failing_checkpoint_reads() -> Arc<Self> {
        let store = Self::default();
        store.state.lock().unwrap().fail_checkpoint_reads = true;
        Arc::new(store)
    }

    fn failing_saves() -> Arc<Self> {
        let store = Self::default();
        store.state.lock().unwrap().fail_saves = true;
        Arc::new(store)
    }

    /// Fail only the next save; later saves succeed.
    fn fail_next_save(&self) {
        self.state.lock().unwrap().fail_next_save = true;
    }

    fn checkpoint(&self) -> i64 {
        self.state.lock().unwrap().checkpoint
    }

    fn saved_ids(&self) -> Vec<i64> {
        self.state.lock().unwrap().saved.keys().copied().collect()
    }

    fn batches(&self) -> Vec<Vec<i64>> {
        self.state.lock().unwrap().batches.clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn last_processed_id(&self) -> anyhow::Result<i64> {
        let state = self.state.lock().unwrap();
        if state.fail_checkpoint_reads {
            anyhow::bail!("connection refused");
        }
        Ok(state.checkpoint)
    }

    async fn save_batch(&self, delegations: &[Delegation]) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_saves || std::mem::take(&mut state.fail_next_save) {
            anyhow::bail!("disk full");
        }

        for delegation in delegations {
            state
                .saved
                .entry(delegation.id)
                .or_insert_with(|| delegation.clone());
        }
        if let Some(last) = delegations.last() {
            state.checkpoint = state.checkpoint.max(last.id);
        }
        state
            .batches
            .push(delegations.iter().map(|d| d.id).collect());

        Ok(())
    }
}

// ==================== HELPERS ====================

fn tzkt_delegation(id: i64) -> TzktDelegation {
    TzktDelegation {
        id,
        level: 100 + id,
        timestamp: format!("2024-01-01T00:{:02}:00Z", id % 60),
        sender: Sender {
            address: format!("tz1{:03}", id),
        },
        amount: 1_000_000 + id as u64 * 100_000,
    }
}

fn scraper(
    feed: Arc<FakeFeed>,
    store: Arc<MemoryStore>,
    batch_size: u64,
) -> (ScraperService, ManualClock) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    let service = ScraperService::new(
        feed,
        store,
        ScraperOptions::default()
            .with_batch_size(batch_size)
            .with_poll_interval(Duration::from_millis(1))
            .with_clock(Arc::new(clock.clone())),
    );
    (service, clock)
}

async fn next_event(events: &mut mpsc::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
}

async fn assert_stream_closed(events: &mut mpsc::Receiver<Event>) {
    let next = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for stream to close");
    assert!(next.is_none(), "unexpected event {:?}", next);
}

/// Run until polling starts, then shut down; returns every emitted event.
async fn run_backfill(service: &ScraperService) -> Vec<Event> {
    let shutdown = ShutdownSignal::new();
    let (mut events, done) = service.start(shutdown.clone());

    let mut seen = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
    {
        if matches!(event, Event::PollingStarted(_)) {
            shutdown.cancel();
        }
        seen.push(event);
    }

    done.await.unwrap();
    seen
}

/// Start, then consume events up to and including `PollingStarted`.
async fn start_polling(
    service: &ScraperService,
) -> (ShutdownSignal, mpsc::Receiver<Event>, tokio::task::JoinHandle<()>) {
    let shutdown = ShutdownSignal::new();
    let (mut events, done) = service.start(shutdown.clone());

    loop {
        if let Event::PollingStarted(_) = next_event(&mut events).await {
            break;
        }
    }

    (shutdown, events, done)
}

fn names(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(Event::name).collect()
}

fn backfill_checkpoints(events: &[Event]) -> Vec<i64> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::BackfillSyncCompleted(sync) => Some(sync.checkpoint),
            _ => None,
        })
        .collect()
}

// ==================== BACKFILL ====================

#[tokio::test]
async fn test_backfill_one_record_per_page() {
    let feed = FakeFeed::with_ids([1, 2, 3]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed, store.clone(), 1);

    let events = run_backfill(&service).await;

    assert_eq!(
        names(&events),
        vec![
            "BackfillStarted",
            "BackfillSyncCompleted",
            "BackfillSyncCompleted",
            "BackfillSyncCompleted",
            "BackfillDone",
            "PollingStarted",
            "PollingShutdown",
        ]
    );
    assert_eq!(backfill_checkpoints(&events), vec![1, 2, 3]);
    match &events[4] {
        Event::BackfillDone(done) => assert_eq!(done.total_processed, 3),
        other => panic!("expected BackfillDone, got {:?}", other),
    }
    assert_eq!(store.checkpoint(), 3);
    assert_eq!(store.saved_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_backfill_saves_converted_records() {
    let feed = FakeFeed::with_ids([5]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed, store.clone(), 10);

    run_backfill(&service).await;

    let saved = store.state.lock().unwrap().saved.get(&5).cloned().unwrap();
    assert_eq!(saved.delegator, "tz1005");
    assert_eq!(saved.level, 105);
    assert_eq!(saved.amount, num_bigint::BigUint::from(1_500_000u64));
    assert_eq!(
        saved.timestamp,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()
    );
}

#[tokio::test]
async fn test_checkpoint_tracks_highest_saved_id() {
    let feed = FakeFeed::with_ids([1, 2, 3, 4, 5]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed, store.clone(), 2);

    let events = run_backfill(&service).await;

    assert_eq!(backfill_checkpoints(&events), vec![2, 4, 5]);
    assert_eq!(store.batches(), vec![vec![1, 2], vec![3, 4], vec![5]]);
    assert_eq!(store.checkpoint(), 5);
}

#[tokio::test]
async fn test_backfill_resumes_after_stored_checkpoint() {
    let feed = FakeFeed::with_ids(1..=15);
    let store = MemoryStore::with_checkpoint(10);
    let (service, _clock) = scraper(feed.clone(), store.clone(), 100);

    let events = run_backfill(&service).await;

    match &events[0] {
        Event::BackfillStarted(started) => assert_eq!(started.checkpoint, 10),
        other => panic!("expected BackfillStarted, got {:?}", other),
    }
    assert_eq!(store.saved_ids(), vec![11, 12, 13, 14, 15]);
    assert_eq!(store.checkpoint(), 15);
    assert_eq!(feed.requests()[0], DelegationsRequest::after(10, 100));
}

#[tokio::test]
async fn test_rerun_when_up_to_date_saves_nothing() {
    let feed = FakeFeed::with_ids([1, 2, 3]);
    let store = MemoryStore::with_checkpoint(3);
    let (service, _clock) = scraper(feed, store.clone(), 10);

    let events = run_backfill(&service).await;

    assert!(backfill_checkpoints(&events).is_empty());
    assert!(events.iter().any(|e| matches!(
        e,
        Event::BackfillDone(BackfillDone {
            total_processed: 0,
            ..
        })
    )));
    assert!(store.batches().is_empty());
    assert_eq!(store.checkpoint(), 3);
}

#[tokio::test]
async fn test_backfill_done_precedes_polling_started_once() {
    let feed = FakeFeed::with_ids(1..=7);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed, store, 3);

    let events = run_backfill(&service).await;
    let names = names(&events);

    let done: Vec<usize> = positions(&names, "BackfillDone");
    let started: Vec<usize> = positions(&names, "PollingStarted");
    assert_eq!(done.len(), 1);
    assert_eq!(started.len(), 1);
    assert_eq!(done[0] + 1, started[0]);
}

fn positions(names: &[&str], wanted: &str) -> Vec<usize> {
    names
        .iter()
        .enumerate()
        .filter(|(_, name)| **name == wanted)
        .map(|(i, _)| i)
        .collect()
}

#[tokio::test]
async fn test_backfill_elapsed_is_measured_on_clock() {
    let feed = FakeFeed::with_ids([1, 2]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, clock) = scraper(feed.clone(), store, 1);
    // Three fetches (two pages, then the empty one), each taking 14s
    feed.advance_clock_on_fetch(&clock, Duration::from_secs(14));

    let events = run_backfill(&service).await;

    let done = events
        .iter()
        .find_map(|e| match e {
            Event::BackfillDone(done) => Some(done.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(done.total_processed, 2);
    assert_eq!(done.elapsed, Duration::from_secs(42));
}

// ==================== FAILURES ====================

#[tokio::test]
async fn test_fetch_failure_during_backfill_is_fatal() {
    let feed = FakeFeed::with_ids([1, 2]);
    feed.fail_on_call(1);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed, store.clone(), 1);

    // Never cancelled: the run must end on its own
    let (mut events, done) = service.start(ShutdownSignal::new());

    assert!(matches!(
        next_event(&mut events).await,
        Event::BackfillStarted(_)
    ));
    match next_event(&mut events).await {
        Event::BackfillError(BackfillError {
            error: SyncError::ApiRequest(FeedError::UnexpectedStatus(status)),
        }) => assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE),
        other => panic!("expected BackfillError, got {:?}", other),
    }
    assert_stream_closed(&mut events).await;
    done.await.unwrap();

    assert!(store.batches().is_empty());
    assert_eq!(store.checkpoint(), 0);
}

#[tokio::test]
async fn test_fetch_failure_after_some_batches_keeps_committed_progress() {
    let feed = FakeFeed::with_ids([1, 2, 3]);
    feed.fail_on_call(3);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed, store.clone(), 1);

    let (mut events, done) = service.start(ShutdownSignal::new());
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    done.await.unwrap();

    assert_eq!(
        names(&seen),
        vec![
            "BackfillStarted",
            "BackfillSyncCompleted",
            "BackfillSyncCompleted",
            "BackfillError",
        ]
    );
    assert_eq!(store.checkpoint(), 2);
}

#[tokio::test]
async fn test_checkpoint_failure_at_startup_is_backfill_error() {
    let feed = FakeFeed::with_ids([1]);
    let store = MemoryStore::failing_checkpoint_reads();
    let (service, _clock) = scraper(feed.clone(), store, 1);

    let (mut events, done) = service.start(ShutdownSignal::new());

    match next_event(&mut events).await {
        Event::BackfillError(BackfillError {
            error: SyncError::CheckpointRetrieval(e),
        }) => assert!(e.to_string().contains("connection refused")),
        other => panic!("expected BackfillError, got {:?}", other),
    }
    assert_stream_closed(&mut events).await;
    done.await.unwrap();

    assert!(feed.requests().is_empty());
}

#[tokio::test]
async fn test_save_failure_during_backfill_is_fatal() {
    let feed = FakeFeed::with_ids([1]);
    let store = MemoryStore::failing_saves();
    let (service, _clock) = scraper(feed, store.clone(), 1);

    let (mut events, done) = service.start(ShutdownSignal::new());

    assert!(matches!(
        next_event(&mut events).await,
        Event::BackfillStarted(_)
    ));
    match next_event(&mut events).await {
        Event::BackfillError(BackfillError {
            error: error @ SyncError::SaveBatch(_),
        }) => assert!(error.to_string().starts_with("save batch failed")),
        other => panic!("expected BackfillError, got {:?}", other),
    }
    assert_stream_closed(&mut events).await;
    done.await.unwrap();

    assert_eq!(store.checkpoint(), 0);
}

#[tokio::test]
async fn test_unordered_page_during_backfill_is_fatal() {
    let feed = FakeFeed::with_ids([]);
    feed.script_page(&[3, 2]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed, store.clone(), 10);

    let (mut events, done) = service.start(ShutdownSignal::new());

    assert!(matches!(
        next_event(&mut events).await,
        Event::BackfillStarted(_)
    ));
    match next_event(&mut events).await {
        Event::BackfillError(BackfillError {
            error:
                SyncError::Conversion(ConversionError::UnorderedBatch {
                    previous: 3,
                    next: 2,
                }),
        }) => {},
        other => panic!("expected BackfillError, got {:?}", other),
    }
    assert_stream_closed(&mut events).await;
    done.await.unwrap();

    assert!(store.batches().is_empty());
    assert_eq!(store.checkpoint(), 0);
}

// ==================== POLLING ====================

#[tokio::test]
async fn test_poll_picks_up_new_delegation() {
    let feed = FakeFeed::with_ids([]);
    let store = MemoryStore::with_checkpoint(5);
    let (service, clock) = scraper(feed.clone(), store.clone(), 1);

    let (shutdown, mut events, done) = start_polling(&service).await;

    feed.push(6);
    clock.tick().await;

    match next_event(&mut events).await {
        Event::PollingSyncCompleted(cycle) => {
            assert_eq!(cycle.fetched, 1);
            assert_eq!(cycle.checkpoint, 6);
            assert_eq!(cycle.batch_size, 1);
        },
        other => panic!("expected PollingSyncCompleted, got {:?}", other),
    }
    assert_eq!(store.checkpoint(), 6);

    shutdown.cancel();
    assert!(matches!(
        next_event(&mut events).await,
        Event::PollingShutdown(_)
    ));
    assert_stream_closed(&mut events).await;
    done.await.unwrap();
}

#[tokio::test]
async fn test_empty_poll_still_reports_cycle() {
    let feed = FakeFeed::with_ids([]);
    let store = MemoryStore::with_checkpoint(9);
    let (service, clock) = scraper(feed, store, 1);

    let (shutdown, mut events, done) = start_polling(&service).await;

    clock.tick().await;
    match next_event(&mut events).await {
        Event::PollingSyncCompleted(cycle) => {
            assert_eq!(cycle.fetched, 0);
            assert_eq!(cycle.checkpoint, 9);
        },
        other => panic!("expected PollingSyncCompleted, got {:?}", other),
    }

    shutdown.cancel();
    while events.recv().await.is_some() {}
    done.await.unwrap();
}

#[tokio::test]
async fn test_poll_uses_same_cursor_as_backfill() {
    let feed = FakeFeed::with_ids([1, 2]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, clock) = scraper(feed.clone(), store, 2);

    let (shutdown, mut events, done) = start_polling(&service).await;
    feed.push(3);
    clock.tick().await;
    next_event(&mut events).await;

    shutdown.cancel();
    while events.recv().await.is_some() {}
    done.await.unwrap();

    assert_eq!(
        feed.requests(),
        vec![
            DelegationsRequest::after(0, 2),
            DelegationsRequest::after(2, 2),
            DelegationsRequest::after(2, 2),
        ]
    );
}

#[tokio::test]
async fn test_poll_failure_is_not_fatal() {
    let feed = FakeFeed::with_ids([]);
    // Call 1 is the empty backfill page, call 2 the first poll
    feed.fail_on_call(2);
    let store = MemoryStore::with_checkpoint(0);
    let (service, clock) = scraper(feed.clone(), store.clone(), 1);

    let (shutdown, mut events, done) = start_polling(&service).await;

    clock.tick().await;
    match next_event(&mut events).await {
        Event::PollingError(PollingError {
            error: SyncError::ApiRequest(_),
        }) => {},
        other => panic!("expected PollingError, got {:?}", other),
    }

    feed.push(1);
    clock.tick().await;
    match next_event(&mut events).await {
        Event::PollingSyncCompleted(cycle) => {
            assert_eq!(cycle.fetched, 1);
            assert_eq!(cycle.checkpoint, 1);
        },
        other => panic!("expected PollingSyncCompleted, got {:?}", other),
    }
    assert_eq!(store.checkpoint(), 1);

    shutdown.cancel();
    while events.recv().await.is_some() {}
    done.await.unwrap();
}

#[tokio::test]
async fn test_poll_save_failure_is_not_fatal() {
    let feed = FakeFeed::with_ids([]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, clock) = scraper(feed.clone(), store.clone(), 1);

    let (shutdown, mut events, done) = start_polling(&service).await;

    feed.push(1);
    store.fail_next_save();
    clock.tick().await;
    match next_event(&mut events).await {
        Event::PollingError(PollingError {
            error: SyncError::SaveBatch(e),
        }) => assert!(e.to_string().contains("disk full")),
        other => panic!("expected PollingError, got {:?}", other),
    }
    assert_eq!(store.checkpoint(), 0);

    // Same page again on the next tick, this time saved
    clock.tick().await;
    match next_event(&mut events).await {
        Event::PollingSyncCompleted(cycle) => {
            assert_eq!(cycle.fetched, 1);
            assert_eq!(cycle.checkpoint, 1);
        },
        other => panic!("expected PollingSyncCompleted, got {:?}", other),
    }
    assert_eq!(store.checkpoint(), 1);
    assert_eq!(store.saved_ids(), vec![1]);

    shutdown.cancel();
    while events.recv().await.is_some() {}
    done.await.unwrap();
}

#[tokio::test]
async fn test_unordered_poll_page_is_not_fatal() {
    let feed = FakeFeed::with_ids([]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, clock) = scraper(feed.clone(), store.clone(), 10);

    let (shutdown, mut events, done) = start_polling(&service).await;

    feed.script_page(&[5, 4]);
    clock.tick().await;
    match next_event(&mut events).await {
        Event::PollingError(PollingError {
            error: SyncError::Conversion(ConversionError::UnorderedBatch { .. }),
        }) => {},
        other => panic!("expected PollingError, got {:?}", other),
    }

    feed.push(4);
    feed.push(5);
    clock.tick().await;
    match next_event(&mut events).await {
        Event::PollingSyncCompleted(cycle) => {
            assert_eq!(cycle.fetched, 2);
            assert_eq!(cycle.checkpoint, 5);
        },
        other => panic!("expected PollingSyncCompleted, got {:?}", other),
    }

    shutdown.cancel();
    while events.recv().await.is_some() {}
    done.await.unwrap();
}

// ==================== SHUTDOWN ====================

#[tokio::test]
async fn test_cancel_while_waiting_for_tick() {
    let feed = FakeFeed::with_ids([]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed, store, 1);

    let (shutdown, mut events, done) = start_polling(&service).await;
    shutdown.cancel();

    match next_event(&mut events).await {
        Event::PollingShutdown(event) => assert_eq!(event.reason, CancelReason::Requested),
        other => panic!("expected PollingShutdown, got {:?}", other),
    }
    assert_stream_closed(&mut events).await;
    done.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_deadline_shutdown_reports_cause() {
    let feed = FakeFeed::with_ids([]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed, store, 1);

    let shutdown = ShutdownSignal::new().with_deadline(Duration::from_millis(50));
    let (mut events, done) = service.start(shutdown);

    let mut shutdowns = Vec::new();
    while let Some(event) = events.recv().await {
        if let Event::PollingShutdown(event) = event {
            shutdowns.push(event.reason);
        }
    }
    done.await.unwrap();

    assert_eq!(shutdowns, vec![CancelReason::DeadlineExceeded]);
}

#[tokio::test]
async fn test_cancel_before_start_stops_backfill_without_error() {
    let feed = FakeFeed::with_ids([1, 2, 3]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed.clone(), store.clone(), 1);

    let shutdown = ShutdownSignal::new();
    shutdown.cancel();
    let (mut events, done) = service.start(shutdown);

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    done.await.unwrap();

    assert_eq!(names(&seen), vec!["BackfillStarted", "PollingShutdown"]);
    assert!(feed.requests().is_empty());
    assert_eq!(store.checkpoint(), 0);
}

// ==================== SUBSCRIBER ====================

#[tokio::test]
async fn test_subscriber_observes_full_backfill() {
    let feed = FakeFeed::with_ids([1, 2, 3]);
    let store = MemoryStore::with_checkpoint(0);
    let (service, _clock) = scraper(feed, store.clone(), 1);

    let shutdown = ShutdownSignal::new();
    let (events, done) = service.start(shutdown.clone());

    let checkpoints = Arc::new(Mutex::new(Vec::new()));
    let totals = Arc::new(Mutex::new(Vec::new()));
    let reasons = Arc::new(Mutex::new(Vec::new()));

    let subscriber = {
        let (checkpoints, totals, reasons) =
            (checkpoints.clone(), totals.clone(), reasons.clone());
        Subscriber::new()
            .on_backfill_sync_completed(move |e| checkpoints.lock().unwrap().push(e.checkpoint))
            .on_backfill_done(move |e| totals.lock().unwrap().push(e.total_processed))
            .on_polling_started(move |_| shutdown.cancel())
            .on_polling_shutdown(move |e| reasons.lock().unwrap().push(e.reason))
            .spawn(events)
    };

    done.await.unwrap();
    subscriber.close().await;

    assert_eq!(*checkpoints.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(*totals.lock().unwrap(), vec![3]);
    assert_eq!(*reasons.lock().unwrap(), vec![CancelReason::Requested]);
    assert_eq!(store.checkpoint(), 3);
}
