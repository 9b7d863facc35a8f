use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

/// Time source for the scraper: wall-clock in production, manually driven
/// in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Resolves once `duration` has elapsed on this clock.
    fn after(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn after(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Clock whose timers only fire when told to.
///
/// Every `after` call arms one timer regardless of the duration asked for;
/// [`tick`](ManualClock::tick) fires the oldest armed timer, waiting for one
/// to be armed if there is none yet. `now` only moves with
/// [`advance`](ManualClock::advance).
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<ManualClockInner>,
}

struct ManualClockInner {
    now: Mutex<DateTime<Utc>>,
    armed_tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
    armed_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<oneshot::Sender<()>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        let (armed_tx, armed_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ManualClockInner {
                now: Mutex::new(start),
                armed_tx,
                armed_rx: tokio::sync::Mutex::new(armed_rx),
            }),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.inner.now.lock().unwrap_or_else(|e| e.into_inner());
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        *now = now.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Fire the next live timer. Timers whose waiter has gone away (e.g. a
    /// poll wait abandoned on shutdown) are skipped.
    pub async fn tick(&self) {
        let mut armed = self.inner.armed_rx.lock().await;
        while let Some(timer) = armed.recv().await {
            if timer.send(()).is_ok() {
                return;
            }
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn after(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.inner.armed_tx.send(tx);
        Box::pin(async move {
            let _ = rx.await;
        })
    }
}
