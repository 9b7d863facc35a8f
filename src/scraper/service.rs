use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::scraper::{
    convert_delegations, BackfillDone, BackfillError, BackfillStarted, BackfillSyncCompleted,
    CheckpointStore, Clock, DelegationFeed, Event, PollingError, PollingShutdown,
    PollingStarted, PollingSyncCompleted, ShutdownSignal, SyncError, SystemClock,
};
use crate::tzkt::DelegationsRequest;

pub const DEFAULT_BATCH_SIZE: u64 = 10_000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Capacity of the event stream. The engine blocks when it is full, so
/// consumers must keep draining it.
const EVENT_BUFFER: usize = 10;

/// Scraper configuration. Defaults suit production: wall clock, 10s polling
/// and 10,000 delegations per batch.
#[derive(Clone)]
pub struct ScraperOptions {
    batch_size: u64,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for ScraperOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            clock: Arc::new(SystemClock),
        }
    }
}

impl ScraperOptions {
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Outcome of one fetch-and-save cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SyncResult {
    fetched: usize,
    checkpoint: i64,
}

/// Two-phase delegation scraper.
///
/// 1. Backfill: fetch `batch_size` delegations after the stored checkpoint
///    and save them, until the feed returns an empty page. Any failure ends
///    the run.
/// 2. Polling: on every `poll_interval` tick run the same cycle once.
///    Failures are reported and the next tick tries again.
///
/// Both phases page by "id greater than checkpoint", so the checkpoint alone
/// decides what comes next. The scraper never logs; everything it does is
/// reported on the event stream.
#[derive(Clone)]
pub struct ScraperService {
    feed: Arc<dyn DelegationFeed>,
    store: Arc<dyn CheckpointStore>,
    clock: Arc<dyn Clock>,
    batch_size: u64,
    poll_interval: Duration,
}

impl ScraperService {
    pub fn new(
        feed: Arc<dyn DelegationFeed>,
        store: Arc<dyn CheckpointStore>,
        options: ScraperOptions,
    ) -> Self {
        Self {
            feed,
            store,
            clock: options.clock,
            batch_size: options.batch_size,
            poll_interval: options.poll_interval,
        }
    }

    /// Spawn the run and return its event stream and join handle.
    ///
    /// The stream closes when the run ends, just before the handle resolves.
    /// Cancel `shutdown` to stop; a batch already being saved is finished
    /// first.
    pub fn start(&self, shutdown: ShutdownSignal) -> (mpsc::Receiver<Event>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let service = self.clone();

        let handle = tokio::spawn(async move {
            service.run(shutdown, tx).await;
        });

        (rx, handle)
    }

    async fn run(&self, shutdown: ShutdownSignal, events: mpsc::Sender<Event>) {
        if self.backfill(&shutdown, &events).await {
            self.poll(&shutdown, &events).await;
        }
    }

    /// Returns whether the run should continue with polling.
    async fn backfill(&self, shutdown: &ShutdownSignal, events: &mpsc::Sender<Event>) -> bool {
        let started_at = self.clock.now();

        let checkpoint = match self.store.last_processed_id().await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                emit(
                    events,
                    BackfillError {
                        error: SyncError::CheckpointRetrieval(e),
                    },
                )
                .await;
                return false;
            },
        };

        emit(
            events,
            BackfillStarted {
                started_at,
                checkpoint,
            },
        )
        .await;

        let mut total_processed: u64 = 0;
        loop {
            if shutdown.is_cancelled() {
                emit(
                    events,
                    PollingShutdown {
                        reason: shutdown.reason(),
                    },
                )
                .await;
                return false;
            }

            match self.sync_batch().await {
                Ok(result) if result.fetched == 0 => break,
                Ok(result) => {
                    total_processed += result.fetched as u64;
                    emit(
                        events,
                        BackfillSyncCompleted {
                            fetched: result.fetched,
                            checkpoint: result.checkpoint,
                            batch_size: self.batch_size,
                        },
                    )
                    .await;
                },
                Err(error) => {
                    emit(events, BackfillError { error }).await;
                    return false;
                },
            }
        }

        let elapsed = (self.clock.now() - started_at)
            .to_std()
            .unwrap_or_default();

        emit(
            events,
            BackfillDone {
                total_processed,
                elapsed,
            },
        )
        .await;

        true
    }

    async fn poll(&self, shutdown: &ShutdownSignal, events: &mpsc::Sender<Event>) {
        emit(
            events,
            PollingStarted {
                interval: self.poll_interval,
            },
        )
        .await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    emit(events, PollingShutdown { reason: shutdown.reason() }).await;
                    return;
                },
                _ = self.clock.after(self.poll_interval) => {
                    // Cancelled while the tick was firing: report shutdown on the next pass
                    if shutdown.is_cancelled() {
                        continue;
                    }

                    match self.sync_batch().await {
                        Ok(result) => {
                            emit(
                                events,
                                PollingSyncCompleted {
                                    fetched: result.fetched,
                                    checkpoint: result.checkpoint,
                                    batch_size: self.batch_size,
                                },
                            )
                            .await;
                        },
                        Err(error) => emit(events, PollingError { error }).await,
                    }
                },
            }
        }
    }

    /// Fetch the page after the stored checkpoint and save it atomically.
    async fn sync_batch(&self) -> Result<SyncResult, SyncError> {
        let checkpoint = self
            .store
            .last_processed_id()
            .await
            .map_err(SyncError::CheckpointRetrieval)?;

        let batch = self
            .feed
            .get_delegations(DelegationsRequest::after(checkpoint, self.batch_size))
            .await
            .map_err(SyncError::ApiRequest)?;

        let delegations = convert_delegations(&batch)?;
        let Some(last) = delegations.last() else {
            return Ok(SyncResult {
                fetched: 0,
                checkpoint,
            });
        };
        let new_checkpoint = last.id.max(checkpoint);

        self.store
            .save_batch(&delegations)
            .await
            .map_err(SyncError::SaveBatch)?;

        Ok(SyncResult {
            fetched: delegations.len(),
            checkpoint: new_checkpoint,
        })
    }
}

/// Send an event, waiting for buffer space. A dropped receiver is not an
/// error: the run carries on unobserved.
async fn emit(events: &mpsc::Sender<Event>, event: impl Into<Event>) {
    let _ = events.send(event.into()).await;
}
