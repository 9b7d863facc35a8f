use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::scraper::events::{
    BackfillDone, BackfillError, BackfillStarted, BackfillSyncCompleted, Event, PollingError,
    PollingShutdown, PollingStarted, PollingSyncCompleted,
};

type Handler<E> = Box<dyn FnMut(E) + Send>;

/// Typed dispatcher for scraper events.
///
/// Register at most one handler per event kind, then [`spawn`](Self::spawn)
/// it on the event stream. Kinds without a handler are dropped.
///
/// ```ignore
/// let subscriber = Subscriber::new()
///     .on_backfill_done(|done| info!("backfill done: {}", done.total_processed))
///     .spawn(events);
/// // ...
/// subscriber.close().await; // every event has been handled after this
/// ```
#[derive(Default)]
pub struct Subscriber {
    backfill_started: Option<Handler<BackfillStarted>>,
    backfill_sync_completed: Option<Handler<BackfillSyncCompleted>>,
    backfill_done: Option<Handler<BackfillDone>>,
    backfill_error: Option<Handler<BackfillError>>,
    polling_started: Option<Handler<PollingStarted>>,
    polling_sync_completed: Option<Handler<PollingSyncCompleted>>,
    polling_shutdown: Option<Handler<PollingShutdown>>,
    polling_error: Option<Handler<PollingError>>,
}

impl Subscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_backfill_started(mut self, f: impl FnMut(BackfillStarted) + Send + 'static) -> Self {
        self.backfill_started = Some(Box::new(f));
        self
    }

    pub fn on_backfill_sync_completed(
        mut self,
        f: impl FnMut(BackfillSyncCompleted) + Send + 'static,
    ) -> Self {
        self.backfill_sync_completed = Some(Box::new(f));
        self
    }

    pub fn on_backfill_done(mut self, f: impl FnMut(BackfillDone) + Send + 'static) -> Self {
        self.backfill_done = Some(Box::new(f));
        self
    }

    pub fn on_backfill_error(mut self, f: impl FnMut(BackfillError) + Send + 'static) -> Self {
        self.backfill_error = Some(Box::new(f));
        self
    }

    pub fn on_polling_started(mut self, f: impl FnMut(PollingStarted) + Send + 'static) -> Self {
        self.polling_started = Some(Box::new(f));
        self
    }

    pub fn on_polling_sync_completed(
        mut self,
        f: impl FnMut(PollingSyncCompleted) + Send + 'static,
    ) -> Self {
        self.polling_sync_completed = Some(Box::new(f));
        self
    }

    pub fn on_polling_shutdown(mut self, f: impl FnMut(PollingShutdown) + Send + 'static) -> Self {
        self.polling_shutdown = Some(Box::new(f));
        self
    }

    pub fn on_polling_error(mut self, f: impl FnMut(PollingError) + Send + 'static) -> Self {
        self.polling_error = Some(Box::new(f));
        self
    }

    /// Start dispatching `events` until the stream closes.
    pub fn spawn(mut self, mut events: mpsc::Receiver<Event>) -> SubscriberHandle {
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.dispatch(event);
            }
        });

        SubscriberHandle { handle }
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::BackfillStarted(e) => call(&mut self.backfill_started, e),
            Event::BackfillSyncCompleted(e) => call(&mut self.backfill_sync_completed, e),
            Event::BackfillDone(e) => call(&mut self.backfill_done, e),
            Event::BackfillError(e) => call(&mut self.backfill_error, e),
            Event::PollingStarted(e) => call(&mut self.polling_started, e),
            Event::PollingSyncCompleted(e) => call(&mut self.polling_sync_completed, e),
            Event::PollingShutdown(e) => call(&mut self.polling_shutdown, e),
            Event::PollingError(e) => call(&mut self.polling_error, e),
        }
    }
}

fn call<E>(handler: &mut Option<Handler<E>>, event: E) {
    if let Some(handler) = handler {
        handler(event);
    }
}

/// Join handle of a running [`Subscriber`].
pub struct SubscriberHandle {
    handle: JoinHandle<()>,
}

impl SubscriberHandle {
    /// Wait until the event stream has closed and every event has been
    /// handled. A panic inside a handler is re-raised here.
    pub async fn close(self) {
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
        }
    }
}
