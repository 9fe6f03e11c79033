use std::fmt;
use std::sync::Arc;

use super::histogram::Histogram;
use super::meter::{Meter, RateWindow};
use super::sample::Sample;
use super::snapshot::{PercentileSet, Snapshot};
use crate::clock::Clock;
use crate::context::{ContextSink, Items, SinkSlot};
use crate::error::{InstrumentError, Result};
use crate::ticker::Ticker;
use crate::time::TimeUnit;

/// Latency distribution plus throughput of the timed events.
///
/// Durations are recorded in the chronometer's duration unit; rates are
/// reported per tick unit.
pub struct Chronometer {
    histogram: Histogram,
    meter: Meter,
    duration_unit: TimeUnit,
    sink: SinkSlot,
}

impl Chronometer {
    pub fn new(
        sample: Box<dyn Sample>,
        duration_unit: TimeUnit,
        tick_interval: u64,
        tick_unit: TimeUnit,
        clock: Arc<dyn Clock>,
        ticker: &dyn Ticker,
    ) -> Self {
        Self {
            histogram: Histogram::new(sample),
            meter: Meter::new(tick_interval, tick_unit, clock, ticker),
            duration_unit,
            sink: SinkSlot::default(),
        }
    }

    /// Records one event lasting `duration` duration units.
    pub fn update(&self, duration: i64) -> Result<()> {
        if duration < 0 {
            return Err(InstrumentError::NegativeDuration(duration));
        }

        self.record(duration);
        Ok(())
    }

    /// One record per event, carrying both latency and rate facts.
    fn record(&self, duration: i64) {
        let observed = self.histogram.observe(duration);
        self.meter.record(1);

        if let Some(sink) = self.sink.get() {
            let mut items = Items::new(&*sink);
            self.histogram.push_observed(&mut items, &observed);
            self.meter.push_rates(&mut items);
            items.emit();
        }
    }

    /// Records a duration measured in another unit.
    pub fn update_in(&self, duration: i64, unit: TimeUnit) -> Result<()> {
        if duration < 0 {
            return Err(InstrumentError::NegativeDuration(duration));
        }
        self.update(self.duration_unit.convert(duration, unit))
    }

    /// Runs `f`, recording how long it took on the chronometer's clock.
    pub fn time<R>(&self, f: impl FnOnce() -> R) -> R {
        let clock = self.meter.clock();
        let start = clock.tick();
        let result = f();
        let elapsed = clock.tick().saturating_sub(start);

        let elapsed = self
            .duration_unit
            .convert(elapsed.min(i64::MAX as u64) as i64, TimeUnit::Nanoseconds);
        self.record(elapsed);
        result
    }

    pub fn clear(&self) {
        self.histogram.reset();
        self.meter.reset();

        if let Some(sink) = self.sink.get() {
            let mut items = Items::new(&*sink);
            Histogram::push_cleared(&mut items);
            Meter::push_cleared_rates(&mut items);
            items.emit();
        }
    }

    pub fn stop(&self) {
        self.meter.stop();
    }

    pub fn tick(&self) {
        self.meter.tick();
    }

    pub fn count(&self) -> u64 {
        self.histogram.count()
    }

    pub fn sum(&self) -> i64 {
        self.histogram.sum()
    }

    pub fn min(&self) -> i64 {
        self.histogram.min()
    }

    pub fn max(&self) -> i64 {
        self.histogram.max()
    }

    pub fn mean(&self) -> f64 {
        self.histogram.mean()
    }

    pub fn stddev(&self) -> f64 {
        self.histogram.stddev()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.histogram.snapshot()
    }

    pub fn percentiles(&self) -> PercentileSet {
        self.histogram.percentiles()
    }

    pub fn rate(&self, window: RateWindow, unit: TimeUnit) -> f64 {
        self.meter.rate(window, unit)
    }

    pub fn one_minute_rate(&self) -> f64 {
        self.meter.one_minute_rate()
    }

    pub fn five_minute_rate(&self) -> f64 {
        self.meter.five_minute_rate()
    }

    pub fn fifteen_minute_rate(&self) -> f64 {
        self.meter.fifteen_minute_rate()
    }

    pub fn average_rate(&self) -> f64 {
        self.meter.average_rate()
    }

    pub fn duration_unit(&self) -> TimeUnit {
        self.duration_unit
    }

    pub fn rate_unit(&self) -> TimeUnit {
        self.meter.rate_unit()
    }

    pub fn is_stopped(&self) -> bool {
        self.meter.is_stopped()
    }

    /// Each update reports latency and rate facts as a single record.
    pub fn set_context_sink(&self, sink: Option<Arc<dyn ContextSink>>) {
        self.sink.set(sink);
    }
}

impl fmt::Debug for Chronometer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chronometer")
            .field("duration_unit", &self.duration_unit)
            .field("histogram", &self.histogram)
            .field("meter", &self.meter)
            .finish()
    }
}
