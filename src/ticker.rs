//! Periodic tick facility driving rate decay.
//!
//! Meters do not own threads or timers. They hand a weak reference of their
//! tickable state to a [`Ticker`] at construction and keep the returned
//! [`TickSubscription`] so they can cancel it on `stop()` or drop.
//!
//! - [`IntervalTicker`] runs one Tokio task per subscription, so a slow
//!   subscriber never delays another.
//! - [`ManualTicker`] fires subscriptions only when a test asks it to.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{InstrumentError, Result};

/// Something that advances its state once per period.
pub trait Tickable: Send + Sync {
    fn tick(&self);
}

/// A facility that calls [`Tickable::tick`] at a fixed interval.
pub trait Ticker: Send + Sync + fmt::Debug {
    fn subscribe(&self, interval: Duration, target: Weak<dyn Tickable>) -> TickSubscription;
}

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Handle to one periodic registration. Cloning shares the same registration.
#[derive(Debug, Clone)]
pub struct TickSubscription {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TickSubscription {
    fn new() -> Self {
        Self {
            id: NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops future ticks. A tick already in flight may still complete.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            tracing::debug!(subscription = self.id, "tick subscription cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ─── Tokio-backed ticker ─────────────────────────────────────────

/// Ticks each subscriber from its own task on a Tokio runtime.
pub struct IntervalTicker {
    handle: Handle,
    tasks: Mutex<Vec<(TickSubscription, JoinHandle<()>)>>,
}

impl IntervalTicker {
    /// Binds to the runtime of the calling context.
    pub fn new() -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| InstrumentError::NoRuntime)?;
        Ok(Self::with_handle(handle))
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Number of subscriptions whose task is still running.
    pub fn active(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|(_, task)| !task.is_finished());
        tasks.len()
    }

    /// Cancels every subscription and aborts their tasks.
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for (subscription, task) in &tasks {
            subscription.cancel();
            task.abort();
        }
        if !tasks.is_empty() {
            tracing::debug!(count = tasks.len(), "interval ticker shut down");
        }
    }
}

impl Ticker for IntervalTicker {
    fn subscribe(&self, interval: Duration, target: Weak<dyn Tickable>) -> TickSubscription {
        let subscription = TickSubscription::new();
        let flag = subscription.clone();
        let period = interval.max(Duration::from_millis(1));

        let task = self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut timer = tokio::time::interval_at(start, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;
                if flag.is_cancelled() {
                    break;
                }
                match target.upgrade() {
                    Some(target) => target.tick(),
                    // Owner dropped without stopping
                    None => break,
                }
            }
        });

        tracing::debug!(
            subscription = subscription.id(),
            interval_ms = period.as_millis() as u64,
            "tick subscription started"
        );

        let mut tasks = self.tasks.lock();
        tasks.retain(|(_, task)| !task.is_finished());
        tasks.push((subscription.clone(), task));

        subscription
    }
}

impl Drop for IntervalTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for IntervalTicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalTicker")
            .field("tasks", &self.tasks.lock().len())
            .finish()
    }
}

// ─── Deterministic ticker ────────────────────────────────────────

struct ManualEntry {
    subscription: TickSubscription,
    interval: Duration,
    target: Weak<dyn Tickable>,
}

/// Fires subscriptions only on [`tick_all`](ManualTicker::tick_all).
#[derive(Default)]
pub struct ManualTicker {
    entries: Mutex<Vec<ManualEntry>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks every live subscription once, in subscription order.
    pub fn tick_all(&self) {
        let live: Vec<Arc<dyn Tickable>> = {
            let mut entries = self.entries.lock();
            entries.retain(|e| !e.subscription.is_cancelled() && e.target.strong_count() > 0);
            entries.iter().filter_map(|e| e.target.upgrade()).collect()
        };

        // Called outside the lock so a tick may subscribe or cancel.
        for target in live {
            target.tick();
        }
    }

    pub fn tick_n(&self, n: usize) {
        for _ in 0..n {
            self.tick_all();
        }
    }

    pub fn active(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| !e.subscription.is_cancelled() && e.target.strong_count() > 0)
            .count()
    }

    /// Intervals requested by live subscriptions.
    pub fn intervals(&self) -> Vec<Duration> {
        self.entries
            .lock()
            .iter()
            .filter(|e| !e.subscription.is_cancelled())
            .map(|e| e.interval)
            .collect()
    }
}

impl Ticker for ManualTicker {
    fn subscribe(&self, interval: Duration, target: Weak<dyn Tickable>) -> TickSubscription {
        let subscription = TickSubscription::new();
        self.entries.lock().push(ManualEntry {
            subscription: subscription.clone(),
            interval,
            target,
        });
        subscription
    }
}

impl fmt::Debug for ManualTicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTicker")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}
