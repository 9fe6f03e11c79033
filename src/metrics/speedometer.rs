use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::meter::{Meter, RateWindow};
use crate::clock::Clock;
use crate::context::{ContextSink, Items, MetricFact, SinkSlot};
use crate::ticker::Ticker;
use crate::time::TimeUnit;

/// Throughput of events together with the quantity they carry.
///
/// Velocity is quantity rate over event rate, i.e. the decayed average
/// quantity per event. It is NaN or infinite while the event rate is zero.
pub struct Speedometer {
    events: Meter,
    quantity: Meter,
    min: AtomicU64,
    max: AtomicU64,
    sink: SinkSlot,
}

impl Speedometer {
    pub fn new(tick_interval: u64, tick_unit: TimeUnit, clock: Arc<dyn Clock>, ticker: &dyn Ticker) -> Self {
        Self {
            events: Meter::new(tick_interval, tick_unit, clock.clone(), ticker),
            quantity: Meter::new(tick_interval, tick_unit, clock, ticker),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
            sink: SinkSlot::default(),
        }
    }

    /// Records one event carrying `quantity`.
    pub fn update(&self, quantity: u64) {
        // Extremes first: once the event count is visible they are too.
        let min = self.min.fetch_min(quantity, Ordering::AcqRel).min(quantity);
        let max = self.max.fetch_max(quantity, Ordering::AcqRel).max(quantity);
        self.quantity.mark_n(quantity);
        self.events.mark();

        if let Some(sink) = self.sink.get() {
            let mut items = Items::new(&*sink);
            items
                .push(MetricFact::Count, self.events.count())
                .push(MetricFact::Sum, self.quantity.count())
                .push(MetricFact::Min, min)
                .push(MetricFact::Max, max)
                .push_with(MetricFact::Velocity, || self.velocity(RateWindow::OneMinute));
            items.emit();
        }
    }

    pub fn tick(&self) {
        self.events.tick();
        self.quantity.tick();
    }

    pub fn clear(&self) {
        self.events.clear();
        self.quantity.clear();
        self.min.store(u64::MAX, Ordering::Release);
        self.max.store(0, Ordering::Release);
    }

    pub fn stop(&self) {
        self.events.stop();
        self.quantity.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.events.is_stopped() && self.quantity.is_stopped()
    }

    /// Number of updates.
    pub fn count(&self) -> u64 {
        self.events.count()
    }

    /// Total quantity across all updates.
    pub fn total(&self) -> u64 {
        self.quantity.count()
    }

    /// Smallest quantity seen in one update, 0 before the first.
    pub fn min(&self) -> u64 {
        let min = self.min.load(Ordering::Acquire);
        if self.count() == 0 || min == u64::MAX {
            0
        } else {
            min
        }
    }

    pub fn max(&self) -> u64 {
        let max = self.max.load(Ordering::Acquire);
        if self.count() == 0 {
            0
        } else {
            max
        }
    }

    pub fn event_rate(&self, window: RateWindow, unit: TimeUnit) -> f64 {
        self.events.rate(window, unit)
    }

    pub fn quantity_rate(&self, window: RateWindow, unit: TimeUnit) -> f64 {
        self.quantity.rate(window, unit)
    }

    pub fn velocity(&self, window: RateWindow) -> f64 {
        let unit = self.rate_unit();
        self.quantity.rate(window, unit) / self.events.rate(window, unit)
    }

    pub fn average_velocity(&self) -> f64 {
        self.quantity.average_rate() / self.events.average_rate()
    }

    pub fn one_minute_velocity(&self) -> f64 {
        self.velocity(RateWindow::OneMinute)
    }

    pub fn five_minute_velocity(&self) -> f64 {
        self.velocity(RateWindow::FiveMinutes)
    }

    pub fn fifteen_minute_velocity(&self) -> f64 {
        self.velocity(RateWindow::FifteenMinutes)
    }

    pub fn rate_unit(&self) -> TimeUnit {
        self.events.rate_unit()
    }

    pub fn set_context_sink(&self, sink: Option<Arc<dyn ContextSink>>) {
        self.sink.set(sink);
    }
}

impl fmt::Debug for Speedometer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Speedometer")
            .field("count", &self.count())
            .field("total", &self.total())
            .field("min", &self.min())
            .field("max", &self.max())
            .finish()
    }
}
