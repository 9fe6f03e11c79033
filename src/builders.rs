//! Recipes the registry uses to construct metrics on first access.

use std::sync::Arc;

use crate::clock::{system_clock, Clock};
use crate::metrics::{Chronometer, Histogram, Instrument, Meter, SampleKind, Speedometer, Tally};
use crate::ticker::Ticker;
use crate::time::TimeUnit;

/// Knows how to build one kind of metric. Called at most once per registry key.
pub trait MetricBuilder {
    type Output: Instrument;

    fn construct(&self) -> Self::Output;
}

/// Reservoir settings shared by the histogram-backed builders.
#[derive(Debug, Clone, Copy)]
struct Reservoir {
    kind: SampleKind,
    size: usize,
    alpha: f64,
}

impl Reservoir {
    fn of(kind: SampleKind) -> Self {
        Self {
            kind,
            size: SampleKind::DEFAULT_SIZE,
            alpha: SampleKind::DEFAULT_ALPHA,
        }
    }
}

/// Entry points for every builder.
pub struct Metrics;

impl Metrics {
    pub fn tally(initial: i64) -> TallyBuilder {
        TallyBuilder { initial }
    }

    pub fn histogram(samples: SampleKind) -> HistogramBuilder {
        HistogramBuilder {
            reservoir: Reservoir::of(samples),
            clock: system_clock(),
        }
    }

    pub fn meter(tick_interval: u64, tick_unit: TimeUnit, ticker: Arc<dyn Ticker>) -> MeterBuilder {
        MeterBuilder {
            tick_interval,
            tick_unit,
            ticker,
            clock: system_clock(),
        }
    }

    pub fn speedometer(tick_interval: u64, tick_unit: TimeUnit, ticker: Arc<dyn Ticker>) -> SpeedometerBuilder {
        SpeedometerBuilder {
            tick_interval,
            tick_unit,
            ticker,
            clock: system_clock(),
        }
    }

    /// Biased reservoir unless overridden with [`ChronometerBuilder::samples`].
    pub fn chronometer(
        duration_unit: TimeUnit,
        tick_interval: u64,
        tick_unit: TimeUnit,
        ticker: Arc<dyn Ticker>,
    ) -> ChronometerBuilder {
        ChronometerBuilder {
            reservoir: Reservoir::of(SampleKind::Biased),
            duration_unit,
            tick_interval,
            tick_unit,
            ticker,
            clock: system_clock(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TallyBuilder {
    initial: i64,
}

impl MetricBuilder for TallyBuilder {
    type Output = Tally;

    fn construct(&self) -> Tally {
        Tally::new(self.initial)
    }
}

#[derive(Debug, Clone)]
pub struct HistogramBuilder {
    reservoir: Reservoir,
    clock: Arc<dyn Clock>,
}

impl HistogramBuilder {
    pub fn reservoir(mut self, size: usize, alpha: f64) -> Self {
        self.reservoir.size = size;
        self.reservoir.alpha = alpha;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl MetricBuilder for HistogramBuilder {
    type Output = Histogram;

    fn construct(&self) -> Histogram {
        let Reservoir { kind, size, alpha } = self.reservoir;
        Histogram::new(kind.create_with(size, alpha, self.clock.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct MeterBuilder {
    tick_interval: u64,
    tick_unit: TimeUnit,
    ticker: Arc<dyn Ticker>,
    clock: Arc<dyn Clock>,
}

impl MeterBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl MetricBuilder for MeterBuilder {
    type Output = Meter;

    fn construct(&self) -> Meter {
        Meter::new(self.tick_interval, self.tick_unit, self.clock.clone(), &*self.ticker)
    }
}

#[derive(Debug, Clone)]
pub struct SpeedometerBuilder {
    tick_interval: u64,
    tick_unit: TimeUnit,
    ticker: Arc<dyn Ticker>,
    clock: Arc<dyn Clock>,
}

impl SpeedometerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl MetricBuilder for SpeedometerBuilder {
    type Output = Speedometer;

    fn construct(&self) -> Speedometer {
        Speedometer::new(self.tick_interval, self.tick_unit, self.clock.clone(), &*self.ticker)
    }
}

#[derive(Debug, Clone)]
pub struct ChronometerBuilder {
    reservoir: Reservoir,
    duration_unit: TimeUnit,
    tick_interval: u64,
    tick_unit: TimeUnit,
    ticker: Arc<dyn Ticker>,
    clock: Arc<dyn Clock>,
}

impl ChronometerBuilder {
    pub fn samples(mut self, kind: SampleKind) -> Self {
        self.reservoir.kind = kind;
        self
    }

    pub fn reservoir(mut self, size: usize, alpha: f64) -> Self {
        self.reservoir.size = size;
        self.reservoir.alpha = alpha;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl MetricBuilder for ChronometerBuilder {
    type Output = Chronometer;

    fn construct(&self) -> Chronometer {
        let Reservoir { kind, size, alpha } = self.reservoir;
        Chronometer::new(
            kind.create_with(size, alpha, self.clock.clone()),
            self.duration_unit,
            self.tick_interval,
            self.tick_unit,
            self.clock.clone(),
            &*self.ticker,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ticker::ManualTicker;

    #[test]
    fn test_builders_construct_configured_metrics() {
        let ticker = Arc::new(ManualTicker::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());

        let histogram = Metrics::histogram(SampleKind::Uniform)
            .reservoir(16, 0.0)
            .clock(clock.clone())
            .construct();
        assert_eq!(histogram.sample_kind(), SampleKind::Uniform);

        let chronometer = Metrics::chronometer(TimeUnit::Microseconds, 5, TimeUnit::Seconds, ticker.clone())
            .clock(clock.clone())
            .construct();
        assert_eq!(chronometer.duration_unit(), TimeUnit::Microseconds);
        assert_eq!(chronometer.rate_unit(), TimeUnit::Seconds);

        let _meter = Metrics::meter(1, TimeUnit::Minutes, ticker.clone()).clock(clock.clone()).construct();
        let _speedometer = Metrics::speedometer(1, TimeUnit::Seconds, ticker.clone()).clock(clock).construct();
        assert_eq!(ticker.active(), 4);

        assert_eq!(Metrics::tally(3).construct().count(), 3);
    }
}
