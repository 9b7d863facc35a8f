//! Delegation ingestion: backfill from the stored checkpoint, then poll.
//!
//! - [`service`] - the two-phase [`ScraperService`]
//! - [`events`] - lifecycle events and [`SyncError`]
//! - [`subscriber`] - typed event dispatch with drain-on-close
//! - [`clock`] - injectable time source
//! - [`shutdown`] - cancellation carrying its cause
//! - [`ports`] - feed and store traits the service runs against

pub mod clock;
pub mod convert;
pub mod events;
pub mod ports;
pub mod service;
pub mod shutdown;
pub mod subscriber;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use convert::{convert_delegations, ConversionError};
pub use events::{
    BackfillDone, BackfillError, BackfillStarted, BackfillSyncCompleted, Event, PollingError,
    PollingShutdown, PollingStarted, PollingSyncCompleted, SyncError,
};
pub use ports::{CheckpointStore, DelegationFeed};
pub use service::{ScraperOptions, ScraperService, DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL};
pub use shutdown::{CancelReason, ShutdownSignal};
pub use subscriber::{Subscriber, SubscriberHandle};
