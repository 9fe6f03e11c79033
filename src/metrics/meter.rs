use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::ewma::Ewma;
use crate::clock::Clock;
use crate::context::{ContextSink, Items, MetricFact, SinkSlot};
use crate::ticker::{TickSubscription, Tickable, Ticker};
use crate::time::TimeUnit;

/// Which moving average to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindow {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
}

/// The three moving averages, ticked together.
#[derive(Debug)]
struct Rates {
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl Rates {
    fn new(tick_interval: Duration) -> Self {
        Self {
            m1: Ewma::one_minute(tick_interval),
            m5: Ewma::five_minutes(tick_interval),
            m15: Ewma::fifteen_minutes(tick_interval),
        }
    }

    fn window(&self, window: RateWindow) -> &Ewma {
        match window {
            RateWindow::OneMinute => &self.m1,
            RateWindow::FiveMinutes => &self.m5,
            RateWindow::FifteenMinutes => &self.m15,
        }
    }

    fn update(&self, n: u64) {
        self.m1.update(n);
        self.m5.update(n);
        self.m15.update(n);
    }

    fn clear(&self) {
        self.m1.clear();
        self.m5.clear();
        self.m15.clear();
    }
}

impl Tickable for Rates {
    fn tick(&self) {
        self.m1.tick();
        self.m5.tick();
        self.m15.tick();
    }
}

/// Event counter with 1, 5 and 15 minute moving rates and a lifetime average.
///
/// Rates are expressed per tick unit. The meter subscribes to a [`Ticker`]
/// on construction; [`stop`](Meter::stop) (or dropping the meter) cancels
/// that subscription.
pub struct Meter {
    rates: Arc<Rates>,
    count: AtomicU64,
    start_time: AtomicU64,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    rate_unit: TimeUnit,
    subscription: Mutex<Option<TickSubscription>>,
    sink: SinkSlot,
}

impl Meter {
    pub fn new(tick_interval: u64, tick_unit: TimeUnit, clock: Arc<dyn Clock>, ticker: &dyn Ticker) -> Self {
        let interval = tick_unit.to_duration(tick_interval.max(1));
        let rates = Arc::new(Rates::new(interval));

        let target: Arc<dyn Tickable> = rates.clone();
        let subscription = ticker.subscribe(interval, Arc::downgrade(&target));

        Self {
            rates,
            count: AtomicU64::new(0),
            start_time: AtomicU64::new(clock.time_millis()),
            clock,
            tick_interval: interval,
            rate_unit: tick_unit,
            subscription: Mutex::new(Some(subscription)),
            sink: SinkSlot::default(),
        }
    }

    pub fn mark(&self) {
        self.mark_n(1);
    }

    pub fn mark_n(&self, n: u64) {
        let count = self.record(n);

        if let Some(sink) = self.sink.get() {
            let mut items = Items::new(&*sink);
            items.push(MetricFact::Count, count);
            self.push_rates(&mut items);
            items.emit();
        }
    }

    /// Counts `n` events without reporting them; returns the new count.
    pub(crate) fn record(&self, n: u64) -> u64 {
        let count = self.count.fetch_add(n, Ordering::AcqRel) + n;
        self.rates.update(n);
        count
    }

    pub(crate) fn push_rates(&self, items: &mut Items<'_>) {
        items
            .push_with(MetricFact::M1Avg, || self.one_minute_rate())
            .push_with(MetricFact::M5Avg, || self.five_minute_rate())
            .push_with(MetricFact::M15Avg, || self.fifteen_minute_rate())
            .push_with(MetricFact::AvgRate, || self.average_rate());
    }

    /// Advances the moving averages by one interval. Safe to call alongside
    /// the ticker; every call blends once.
    pub fn tick(&self) {
        self.rates.tick();
    }

    /// Resets the count, the start time and all moving averages.
    pub fn clear(&self) {
        self.reset();

        if let Some(sink) = self.sink.get() {
            let mut items = Items::new(&*sink);
            items.push(MetricFact::Count, 0_i64);
            Self::push_cleared_rates(&mut items);
            items.emit();
        }
    }

    pub(crate) fn reset(&self) {
        self.start_time.store(self.clock.time_millis(), Ordering::Release);
        self.count.store(0, Ordering::Release);
        self.rates.clear();
    }

    pub(crate) fn push_cleared_rates(items: &mut Items<'_>) {
        items
            .push(MetricFact::M1Avg, 0.0)
            .push(MetricFact::M5Avg, 0.0)
            .push(MetricFact::M15Avg, 0.0);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn rate(&self, window: RateWindow, unit: TimeUnit) -> f64 {
        self.rates.window(window).rate(unit)
    }

    pub fn one_minute_rate(&self) -> f64 {
        self.rate(RateWindow::OneMinute, self.rate_unit)
    }

    pub fn five_minute_rate(&self) -> f64 {
        self.rate(RateWindow::FiveMinutes, self.rate_unit)
    }

    pub fn fifteen_minute_rate(&self) -> f64 {
        self.rate(RateWindow::FifteenMinutes, self.rate_unit)
    }

    /// Events per rate unit since start (or the last clear), without decay.
    /// Infinite if events were marked but no wall-clock time has passed.
    pub fn average_rate(&self) -> f64 {
        self.average_rate_in(self.rate_unit)
    }

    pub fn average_rate_in(&self, unit: TimeUnit) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }

        let elapsed_ms = self
            .clock
            .time_millis()
            .saturating_sub(self.start_time.load(Ordering::Acquire));
        let per_ms = count as f64 / elapsed_ms as f64;

        per_ms * TimeUnit::Milliseconds.convert_f64(1.0, unit)
    }

    pub fn rate_unit(&self) -> TimeUnit {
        self.rate_unit
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Cancels future ticks. Idempotent.
    pub fn stop(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.subscription.lock().is_none()
    }

    pub fn set_context_sink(&self, sink: Option<Arc<dyn ContextSink>>) {
        self.sink.set(sink);
    }
}

impl Drop for Meter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("count", &self.count())
            .field("rate_unit", &self.rate_unit)
            .field("tick_interval", &self.tick_interval)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::context::{CollectingSink, FactSet, MetricValue};
    use crate::ticker::ManualTicker;

    fn meter() -> (Arc<ManualClock>, ManualTicker, Meter) {
        let clock = Arc::new(ManualClock::starting_at(1_000_000));
        let ticker = ManualTicker::new();
        let meter = Meter::new(5, TimeUnit::Seconds, clock.clone(), &ticker);
        (clock, ticker, meter)
    }

    #[test]
    fn test_mark_counts_and_rates() {
        let (clock, ticker, meter) = meter();
        meter.mark();
        meter.mark_n(9);
        assert_eq!(meter.count(), 10);
        assert_eq!(meter.one_minute_rate(), 0.0);

        clock.advance(Duration::from_secs(5));
        ticker.tick_all();

        // 10 events over a 5 second tick
        assert!((meter.one_minute_rate() - 2.0).abs() < 1e-9);
        assert!((meter.five_minute_rate() - 2.0).abs() < 1e-9);
        assert!((meter.fifteen_minute_rate() - 2.0).abs() < 1e-9);
        assert!((meter.rate(RateWindow::OneMinute, TimeUnit::Minutes) - 120.0).abs() < 1e-6);
        assert!((meter.average_rate() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_rate_edge_cases() {
        let (clock, _ticker, meter) = meter();
        assert_eq!(meter.average_rate(), 0.0);

        meter.mark();
        assert!(meter.average_rate().is_infinite());

        clock.advance(Duration::from_secs(4));
        assert!((meter.average_rate() - 0.25).abs() < 1e-9);
        assert!((meter.average_rate_in(TimeUnit::Minutes) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_subscribes_with_tick_interval() {
        let (_clock, ticker, meter) = meter();
        assert_eq!(ticker.intervals(), vec![Duration::from_secs(5)]);
        assert_eq!(meter.tick_interval(), Duration::from_secs(5));
        assert_eq!(ticker.active(), 1);
    }

    #[test]
    fn test_stop_cancels_ticks() {
        let (_clock, ticker, meter) = meter();
        meter.mark_n(5);
        meter.stop();
        meter.stop();
        assert!(meter.is_stopped());

        ticker.tick_all();
        assert_eq!(meter.one_minute_rate(), 0.0);
        assert_eq!(ticker.active(), 0);

        // Direct ticks still work
        meter.tick();
        assert!((meter.one_minute_rate() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (_clock, ticker, meter) = meter();
        drop(meter);
        assert_eq!(ticker.active(), 0);
    }

    #[test]
    fn test_clear() {
        let (clock, ticker, meter) = meter();
        meter.mark_n(20);
        ticker.tick_all();
        clock.advance(Duration::from_secs(10));

        meter.clear();
        assert_eq!(meter.count(), 0);
        assert_eq!(meter.one_minute_rate(), 0.0);
        assert_eq!(meter.average_rate(), 0.0);

        meter.mark_n(10);
        clock.advance(Duration::from_secs(5));
        assert!((meter.average_rate() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_context_sink() {
        let (_clock, _ticker, meter) = meter();
        let sink = Arc::new(CollectingSink::new(
            FactSet::empty().with(MetricFact::Count).with(MetricFact::M1Avg),
        ));
        meter.set_context_sink(Some(sink.clone()));

        meter.mark_n(3);
        assert_eq!(sink.last(MetricFact::Count), Some(MetricValue::Int(3)));
        assert_eq!(sink.last(MetricFact::M1Avg), Some(MetricValue::Float(0.0)));
        assert_eq!(sink.last(MetricFact::AvgRate), None);
    }
}
