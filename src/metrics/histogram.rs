use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::sample::{Sample, SampleKind};
use super::snapshot::{PercentileSet, Snapshot};
use crate::context::{ContextSink, Items, MetricFact, MetricValue, SinkSlot};

/// Welford's running mean and sum of squared deviations, always swapped as one pair.
#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    n: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn push(&mut self, value: f64) {
        self.n += 1;
        if self.n == 1 {
            self.mean = value;
            self.m2 = 0.0;
        } else {
            let delta = value - self.mean;
            self.mean += delta / self.n as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    fn variance(&self) -> f64 {
        if self.n <= 1 {
            0.0
        } else {
            self.m2 / (self.n - 1) as f64
        }
    }
}

/// Aggregates after one update, as reported to the context sink.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Observed {
    pub(crate) count: u64,
    pub(crate) sum: i64,
    pub(crate) min: i64,
    pub(crate) max: i64,
    pub(crate) stddev: f64,
}

/// Running count/sum/min/max/variance plus a reservoir for quantiles.
///
/// Each scalar is updated independently and without a shared lock: count and
/// sum by `fetch_add`, min and max by atomic compare-and-replace, and the
/// Welford pair under its own short critical section. Readers never see the
/// internal min/max sentinels; those read as 0.
pub struct Histogram {
    sample: Box<dyn Sample>,
    count: AtomicU64,
    sum: AtomicI64,
    min: AtomicI64,
    max: AtomicI64,
    variance: Mutex<Welford>,
    sink: SinkSlot,
}

impl Histogram {
    pub fn new(sample: Box<dyn Sample>) -> Self {
        Self {
            sample,
            count: AtomicU64::new(0),
            sum: AtomicI64::new(0),
            min: AtomicI64::new(i64::MAX),
            max: AtomicI64::new(i64::MIN),
            variance: Mutex::new(Welford::default()),
            sink: SinkSlot::default(),
        }
    }

    pub fn update(&self, value: i64) {
        let observed = self.observe(value);

        if let Some(sink) = self.sink.get() {
            let mut items = Items::new(&*sink);
            self.push_observed(&mut items, &observed);
            items.emit();
        }
    }

    /// Folds `value` into every aggregate without reporting it.
    ///
    /// Min and max move before the count, so a reader that sees a non-zero
    /// count never loads an untouched sentinel.
    pub(crate) fn observe(&self, value: i64) -> Observed {
        let min = self.min.fetch_min(value, Ordering::AcqRel).min(value);
        let max = self.max.fetch_max(value, Ordering::AcqRel).max(value);
        let sum = self.sum.fetch_add(value, Ordering::AcqRel).wrapping_add(value);
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        let welford = {
            let mut variance = self.variance.lock();
            variance.push(value as f64);
            *variance
        };

        self.sample.update(value);

        Observed {
            count,
            sum,
            min,
            max,
            stddev: welford.variance().sqrt(),
        }
    }

    pub(crate) fn push_observed(&self, items: &mut Items<'_>, observed: &Observed) {
        items
            .push(MetricFact::Count, observed.count)
            .push(MetricFact::Sum, observed.sum)
            .push(MetricFact::Min, observed.min)
            .push(MetricFact::Max, observed.max)
            .push(MetricFact::Avg, observed.sum as f64 / observed.count as f64)
            .push(MetricFact::StdDev, observed.stddev);
        self.push_quantiles(items);
    }

    fn push_quantiles(&self, items: &mut Items<'_>) {
        const QUANTILES: [MetricFact; 6] = [
            MetricFact::Median,
            MetricFact::P75,
            MetricFact::P95,
            MetricFact::P98,
            MetricFact::P99,
            MetricFact::P999,
        ];
        if !items.traces_any(&QUANTILES) {
            return;
        }

        let snapshot = self.sample.snapshot();
        items
            .push(MetricFact::Median, snapshot.median())
            .push(MetricFact::P75, snapshot.p75())
            .push(MetricFact::P95, snapshot.p95())
            .push(MetricFact::P98, snapshot.p98())
            .push(MetricFact::P99, snapshot.p99())
            .push(MetricFact::P999, snapshot.p999());
    }

    /// Resets every aggregate and the reservoir.
    pub fn clear(&self) {
        self.reset();

        if let Some(sink) = self.sink.get() {
            let mut items = Items::new(&*sink);
            Self::push_cleared(&mut items);
            items.emit();
        }
    }

    /// The count drops to zero before min and max go back to their sentinels.
    pub(crate) fn reset(&self) {
        self.count.store(0, Ordering::Release);
        self.sum.store(0, Ordering::Release);
        self.min.store(i64::MAX, Ordering::Release);
        self.max.store(i64::MIN, Ordering::Release);
        *self.variance.lock() = Welford::default();
        self.sample.clear();
    }

    pub(crate) fn push_cleared(items: &mut Items<'_>) {
        items
            .push(MetricFact::Count, 0_i64)
            .push(MetricFact::Sum, 0_i64)
            .push(MetricFact::Min, MetricValue::Missing)
            .push(MetricFact::Max, MetricValue::Missing)
            .push(MetricFact::Avg, 0.0)
            .push(MetricFact::StdDev, 0.0);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn sum(&self) -> i64 {
        self.sum.load(Ordering::Acquire)
    }

    /// Smallest value seen, or 0 before the first update.
    pub fn min(&self) -> i64 {
        let min = self.min.load(Ordering::Acquire);
        // A still-set sentinel with a real max means a clear is in flight.
        if self.count() == 0 || (min == i64::MAX && self.max.load(Ordering::Acquire) != i64::MAX) {
            0
        } else {
            min
        }
    }

    /// Largest value seen, or 0 before the first update.
    pub fn max(&self) -> i64 {
        let max = self.max.load(Ordering::Acquire);
        if self.count() == 0 || (max == i64::MIN && self.min.load(Ordering::Acquire) != i64::MIN) {
            0
        } else {
            max
        }
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Sample variance, 0 until two values are seen.
    pub fn variance(&self) -> f64 {
        self.variance.lock().variance()
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.sample.snapshot()
    }

    pub fn percentiles(&self) -> PercentileSet {
        PercentileSet::from_snapshot(&self.snapshot())
    }

    pub fn sample_kind(&self) -> SampleKind {
        self.sample.kind()
    }

    pub fn sample_size(&self) -> usize {
        self.sample.size()
    }

    pub fn set_context_sink(&self, sink: Option<Arc<dyn ContextSink>>) {
        self.sink.set(sink);
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("sample", &self.sample.kind())
            .field("count", &self.count())
            .field("sum", &self.sum())
            .field("min", &self.min())
            .field("max", &self.max())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::context::{CollectingSink, FactSet};

    fn uniform() -> Histogram {
        Histogram::new(SampleKind::Uniform.create_with(1028, 0.0, Arc::new(ManualClock::new())))
    }

    #[test]
    fn test_one_to_five() {
        let histogram = uniform();
        for v in 1..=5 {
            histogram.update(v);
        }

        assert_eq!(histogram.count(), 5);
        assert_eq!(histogram.sum(), 15);
        assert_eq!(histogram.min(), 1);
        assert_eq!(histogram.max(), 5);
        assert_eq!(histogram.mean(), 3.0);
        assert!((histogram.stddev() - 2.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(histogram.snapshot().median(), 3.0);
    }

    #[test]
    fn test_empty_is_zeroed() {
        let histogram = uniform();
        assert_eq!(histogram.count(), 0);
        assert_eq!(histogram.sum(), 0);
        assert_eq!(histogram.min(), 0);
        assert_eq!(histogram.max(), 0);
        assert_eq!(histogram.mean(), 0.0);
        assert_eq!(histogram.stddev(), 0.0);
        assert!(!histogram.percentiles().has_data());
    }

    #[test]
    fn test_single_value_has_no_spread() {
        let histogram = uniform();
        histogram.update(-42);
        assert_eq!(histogram.min(), -42);
        assert_eq!(histogram.max(), -42);
        assert_eq!(histogram.stddev(), 0.0);
    }

    #[test]
    fn test_clear_resets_everything() {
        let histogram = uniform();
        for v in [10, -3, 99, 4] {
            histogram.update(v);
        }
        histogram.clear();

        assert_eq!(histogram.count(), 0);
        assert_eq!(histogram.sum(), 0);
        assert_eq!(histogram.min(), 0);
        assert_eq!(histogram.max(), 0);
        assert_eq!(histogram.variance(), 0.0);
        assert_eq!(histogram.sample_size(), 0);

        histogram.update(8);
        assert_eq!(histogram.min(), 8);
        assert_eq!(histogram.max(), 8);
        assert_eq!(histogram.mean(), 8.0);
    }

    #[test]
    fn test_concurrent_updates_agree() {
        let histogram = Arc::new(uniform());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let histogram = Arc::clone(&histogram);
                std::thread::spawn(move || {
                    for v in 1..=1_000 {
                        histogram.update(v);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(histogram.count(), 8_000);
        assert_eq!(histogram.sum(), 8 * 500_500);
        assert_eq!(histogram.min(), 1);
        assert_eq!(histogram.max(), 1_000);
        assert!((histogram.mean() - 500.5).abs() < 1e-9);
    }

    #[test]
    fn test_readers_never_see_sentinels_across_clear() {
        use std::sync::atomic::AtomicBool;

        let histogram = Arc::new(uniform());
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let histogram = Arc::clone(&histogram);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    histogram.update(5);
                    histogram.clear();
                }
            })
        };

        for _ in 0..200_000 {
            let min = histogram.min();
            let max = histogram.max();
            assert!(min == 0 || min == 5, "min read {min}");
            assert!(max == 0 || max == 5, "max read {max}");
        }
        done.store(true, Ordering::Relaxed);
        writer.join().unwrap();
    }

    #[test]
    fn test_context_sink_sees_aggregates() {
        let histogram = uniform();
        let sink = Arc::new(CollectingSink::new(
            FactSet::empty()
                .with(MetricFact::Count)
                .with(MetricFact::Sum)
                .with(MetricFact::Median),
        ));
        histogram.set_context_sink(Some(sink.clone()));

        histogram.update(2);
        histogram.update(4);

        assert_eq!(sink.last(MetricFact::Count), Some(MetricValue::Int(2)));
        assert_eq!(sink.last(MetricFact::Sum), Some(MetricValue::Int(6)));
        assert_eq!(sink.last(MetricFact::Median), Some(MetricValue::Float(3.0)));
        assert_eq!(sink.last(MetricFact::Max), None);

        histogram.clear();
        assert_eq!(sink.last(MetricFact::Count), Some(MetricValue::Int(0)));
    }
}
