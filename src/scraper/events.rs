use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::scraper::{CancelReason, ConversionError};
use crate::tzkt::FeedError;

/// Why a fetch-and-save cycle failed.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("checkpoint retrieval failed: {0:#}")]
    CheckpointRetrieval(#[source] anyhow::Error),

    #[error("API request failed: {0}")]
    ApiRequest(#[source] FeedError),

    #[error("delegation conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("save batch failed: {0:#}")]
    SaveBatch(#[source] anyhow::Error),
}

/// Scraper lifecycle event, emitted on the stream returned by
/// [`ScraperService::start`](crate::scraper::ScraperService::start).
#[derive(Debug)]
pub enum Event {
    BackfillStarted(BackfillStarted),
    BackfillSyncCompleted(BackfillSyncCompleted),
    BackfillDone(BackfillDone),
    BackfillError(BackfillError),
    PollingStarted(PollingStarted),
    PollingSyncCompleted(PollingSyncCompleted),
    PollingShutdown(PollingShutdown),
    PollingError(PollingError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillStarted {
    pub started_at: DateTime<Utc>,
    pub checkpoint: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillSyncCompleted {
    pub fetched: usize,
    pub checkpoint: i64,
    pub batch_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillDone {
    pub total_processed: u64,
    pub elapsed: Duration,
}

/// Backfill failed; the run is over.
#[derive(Debug)]
pub struct BackfillError {
    pub error: SyncError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingStarted {
    pub interval: Duration,
}

/// One polling tick finished. `fetched` may be zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingSyncCompleted {
    pub fetched: usize,
    pub checkpoint: i64,
    pub batch_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingShutdown {
    pub reason: CancelReason,
}

/// A polling tick failed; polling carries on at the next tick.
#[derive(Debug)]
pub struct PollingError {
    pub error: SyncError,
}

macro_rules! impl_into_event {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Event {
                fn from(event: $variant) -> Self {
                    Event::$variant(event)
                }
            }
        )*
    };
}

impl_into_event!(
    BackfillStarted,
    BackfillSyncCompleted,
    BackfillDone,
    BackfillError,
    PollingStarted,
    PollingSyncCompleted,
    PollingShutdown,
    PollingError,
);

impl Event {
    /// Variant name, for logs and assertions.
    pub fn name(&self) -> &'static str {
        match self {
            Event::BackfillStarted(_) => "BackfillStarted",
            Event::BackfillSyncCompleted(_) => "BackfillSyncCompleted",
            Event::BackfillDone(_) => "BackfillDone",
            Event::BackfillError(_) => "BackfillError",
            Event::PollingStarted(_) => "PollingStarted",
            Event::PollingSyncCompleted(_) => "PollingSyncCompleted",
            Event::PollingShutdown(_) => "PollingShutdown",
            Event::PollingError(_) => "PollingError",
        }
    }
}
