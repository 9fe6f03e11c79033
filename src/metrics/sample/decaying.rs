use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{unit_random, Sample, SampleKind};
use crate::clock::Clock;
use crate::metrics::snapshot::Snapshot;

/// Landmark is moved forward at most once per hour of wall-clock time.
const RESCALE_THRESHOLD_MS: u64 = 60 * 60 * 1_000;

/// Totally ordered reservoir key.
#[derive(Debug, Clone, Copy)]
struct Priority(f64);

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.total_cmp(&other.0)
    }
}

/// Cormode et al.'s forward-decay priority reservoir.
///
/// Each value is stored under `exp(alpha * (t - landmark)) / u` with `u`
/// uniform in (0, 1]; the reservoir keeps the `size` highest priorities.
/// Newer values carry exponentially larger weights, so the sample is biased
/// toward recent history. Weights grow without bound as `t` moves away from
/// the landmark, so once per [`RESCALE_THRESHOLD_MS`] every priority is
/// multiplied by `exp(-alpha * (new - old))` and the landmark moves to now.
///
/// Updates share `lock`; clear and rescale take it exclusively.
pub struct ExponentiallyDecayingSample {
    lock: RwLock<()>,
    values: Mutex<BTreeMap<Priority, i64>>,
    clock: Arc<dyn Clock>,
    count: AtomicU64,
    next_scale_time: AtomicU64,
    landmark_secs: AtomicU64,
    alpha: f64,
    reservoir_size: usize,
    random: fn() -> f64,
}

impl ExponentiallyDecayingSample {
    /// `alpha` is the decay factor; higher values bias harder toward new entries.
    pub fn new(reservoir_size: usize, alpha: f64, clock: Arc<dyn Clock>) -> Self {
        let now = clock.time_millis();

        Self {
            lock: RwLock::new(()),
            values: Mutex::new(BTreeMap::new()),
            count: AtomicU64::new(0),
            next_scale_time: AtomicU64::new(now + RESCALE_THRESHOLD_MS),
            landmark_secs: AtomicU64::new(now / 1_000),
            alpha,
            reservoir_size: reservoir_size.max(1),
            random: unit_random,
            clock,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn capacity(&self) -> usize {
        self.reservoir_size
    }

    fn now_secs(&self) -> u64 {
        self.clock.time_millis() / 1_000
    }

    fn weight(&self, elapsed_secs: i64) -> f64 {
        (self.alpha * elapsed_secs as f64).exp()
    }

    fn rescale_if_needed(&self) {
        let now = self.clock.time_millis();
        let next = self.next_scale_time.load(Ordering::Acquire);

        // Only the thread that wins the exchange rescales.
        if now >= next
            && self
                .next_scale_time
                .compare_exchange(next, now + RESCALE_THRESHOLD_MS, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.rescale();
        }
    }

    fn rescale(&self) {
        let _guard = self.lock.write();
        let mut values = self.values.lock();

        let landmark = self.now_secs();
        let previous = self.landmark_secs.swap(landmark, Ordering::AcqRel);
        let factor = (-self.alpha * landmark.saturating_sub(previous) as f64).exp();

        let old = std::mem::take(&mut *values);
        for (priority, value) in old {
            values.insert(Priority(priority.0 * factor), value);
        }

        // Resync the counter with what is actually stored. This can briefly
        // differ from the true number of updates; size() stays bounded either way.
        self.count.store(values.len() as u64, Ordering::Release);

        tracing::debug!(
            entries = values.len(),
            shifted_secs = landmark.saturating_sub(previous),
            "decaying sample rescaled"
        );
    }

    /// Stored priorities in ascending order, paired with their values.
    #[cfg(test)]
    fn priorities(&self) -> Vec<(f64, i64)> {
        let _guard = self.lock.read();
        self.values.lock().iter().map(|(p, v)| (p.0, *v)).collect()
    }

    #[cfg(test)]
    fn with_random(mut self, random: fn() -> f64) -> Self {
        self.random = random;
        self
    }
}

impl Sample for ExponentiallyDecayingSample {
    fn kind(&self) -> SampleKind {
        SampleKind::Biased
    }

    fn update(&self, value: i64) {
        self.rescale_if_needed();

        let _guard = self.lock.read();
        let elapsed = self.now_secs() as i64 - self.landmark_secs.load(Ordering::Acquire) as i64;
        let priority = Priority(self.weight(elapsed) / (self.random)());

        self.count.fetch_add(1, Ordering::AcqRel);

        let mut values = self.values.lock();
        if values.len() < self.reservoir_size {
            values.insert(priority, value);
            return;
        }

        let Some((&lowest, _)) = values.first_key_value() else {
            return;
        };
        if lowest < priority && !values.contains_key(&priority) {
            values.insert(priority, value);
            values.pop_first();
        }
    }

    fn clear(&self) {
        let _guard = self.lock.write();
        let now = self.clock.time_millis();

        self.values.lock().clear();
        self.count.store(0, Ordering::Release);
        self.landmark_secs.store(now / 1_000, Ordering::Release);
        self.next_scale_time.store(now + RESCALE_THRESHOLD_MS, Ordering::Release);
    }

    fn size(&self) -> usize {
        self.count
            .load(Ordering::Acquire)
            .min(self.reservoir_size as u64) as usize
    }

    fn snapshot(&self) -> Snapshot {
        let _guard = self.lock.read();
        Snapshot::from_longs(self.values.lock().values().copied())
    }
}

impl fmt::Debug for ExponentiallyDecayingSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExponentiallyDecayingSample")
            .field("alpha", &self.alpha)
            .field("reservoir_size", &self.reservoir_size)
            .field("count", &self.count.load(Ordering::Relaxed))
            .field("landmark_secs", &self.landmark_secs.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn half() -> f64 {
        0.5
    }

    fn sample(size: usize, alpha: f64) -> (Arc<ManualClock>, ExponentiallyDecayingSample) {
        let clock = Arc::new(ManualClock::starting_at(1_700_000_000_000));
        let sample = ExponentiallyDecayingSample::new(size, alpha, clock.clone());
        (clock, sample)
    }

    #[test]
    fn test_bounded_by_capacity() {
        let (_, sample) = sample(100, 0.99);
        for i in 0..1_000 {
            sample.update(i);
        }
        assert_eq!(sample.size(), 100);
        assert_eq!(sample.snapshot().len(), 100);
    }

    #[test]
    fn test_small_stream_is_kept_whole() {
        let (_, sample) = sample(100, 0.015);
        for i in 0..10 {
            sample.update(i);
        }
        assert_eq!(sample.size(), 10);
        assert_eq!(sample.snapshot().len(), 10);
    }

    #[test]
    fn test_clear() {
        let (_, sample) = sample(10, 0.015);
        for i in 0..100 {
            sample.update(i);
        }
        sample.clear();
        assert_eq!(sample.size(), 0);
        assert!(sample.snapshot().is_empty());
    }

    #[test]
    fn test_biased_toward_recent_values() {
        let (clock, sample) = sample(50, 0.1);
        for i in 0..500 {
            sample.update(i);
        }
        // Ten minutes later the new values outweigh the old ones by e^60.
        clock.advance(Duration::from_secs(600));
        for i in 1_000..1_500 {
            sample.update(i);
        }

        let snapshot = sample.snapshot();
        assert_eq!(snapshot.len(), 50);
        assert!(snapshot.values().iter().all(|v| *v >= 1_000.0));
    }

    #[test]
    fn test_rescale_prefers_later_value() {
        let (clock, sample) = sample(10, 0.015);
        let sample = sample.with_random(half);

        clock.advance(Duration::from_secs(3_599));
        sample.update(1);
        clock.advance(Duration::from_secs(1));
        sample.update(2);

        let priorities = sample.priorities();
        assert_eq!(priorities.len(), 2);
        let before = priorities.iter().find(|(_, v)| *v == 1).unwrap().0;
        let after = priorities.iter().find(|(_, v)| *v == 2).unwrap().0;

        assert!(before < after);
        // The landmark moved to now, so the newest weight is exactly 1.
        assert!((after - 2.0).abs() < 1e-9);
        assert!((before - 2.0 * (-0.015f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_rescale_keeps_weights_finite() {
        let (clock, sample) = sample(10, 0.5);
        for _ in 0..48 {
            clock.advance(Duration::from_secs(3_600));
            sample.update(1);
        }
        assert!(sample.priorities().iter().all(|(p, _)| p.is_finite()));
    }

    #[test]
    fn test_rescale_resyncs_count() {
        let (clock, sample) = sample(10, 0.015);
        let sample = sample.with_random(half);
        // Identical priorities collapse onto one key.
        for _ in 0..5 {
            sample.update(7);
        }
        assert_eq!(sample.size(), 5);

        clock.advance(Duration::from_secs(3_600));
        sample.update(8);
        // One stored entry survived the rescale, then one more was added.
        assert_eq!(sample.size(), 2);
    }
}
