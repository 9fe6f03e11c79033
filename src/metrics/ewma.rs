use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::time::TimeUnit;

/// Exponentially weighted moving average of an event rate.
///
/// `update` only accumulates; the published rate moves on `tick`, which an
/// external driver calls once per tick interval. The rate is stored per
/// nanosecond and scaled on read.
#[derive(Debug)]
pub struct Ewma {
    alpha: f64,
    interval_nanos: f64,
    uncounted: AtomicU64,
    // f64 bits
    rate: AtomicU64,
    initialized: AtomicBool,
}

impl Ewma {
    pub fn new(alpha: f64, tick_interval: Duration) -> Self {
        Self {
            alpha,
            interval_nanos: tick_interval.as_nanos().max(1) as f64,
            uncounted: AtomicU64::new(0),
            rate: AtomicU64::new(0f64.to_bits()),
            initialized: AtomicBool::new(false),
        }
    }

    /// `alpha = 1 - exp(-tick / window)`.
    pub fn with_window(tick_interval: Duration, window: Duration) -> Self {
        let tick = tick_interval.as_secs_f64();
        let window = window.as_secs_f64().max(f64::MIN_POSITIVE);
        Self::new(1.0 - (-tick / window).exp(), tick_interval)
    }

    pub fn one_minute(tick_interval: Duration) -> Self {
        Self::with_window(tick_interval, Duration::from_secs(60))
    }

    pub fn five_minutes(tick_interval: Duration) -> Self {
        Self::with_window(tick_interval, Duration::from_secs(5 * 60))
    }

    pub fn fifteen_minutes(tick_interval: Duration) -> Self {
        Self::with_window(tick_interval, Duration::from_secs(15 * 60))
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn update(&self, n: u64) {
        self.uncounted.fetch_add(n, Ordering::AcqRel);
    }

    /// Drains the accumulated events into the rate. The first tick after
    /// construction or `clear` adopts the instant rate outright.
    pub fn tick(&self) {
        let count = self.uncounted.swap(0, Ordering::AcqRel);
        let instant = count as f64 / self.interval_nanos;

        if self.initialized.swap(true, Ordering::AcqRel) {
            // Concurrent tick drivers each get their blend applied.
            let mut bits = self.rate.load(Ordering::Acquire);
            loop {
                let current = f64::from_bits(bits);
                let next = current + self.alpha * (instant - current);
                match self
                    .rate
                    .compare_exchange_weak(bits, next.to_bits(), Ordering::AcqRel, Ordering::Acquire)
                {
                    Ok(_) => break,
                    Err(actual) => bits = actual,
                }
            }
        } else {
            self.rate.store(instant.to_bits(), Ordering::Release);
        }
    }

    /// Current rate as events per `unit`.
    pub fn rate(&self, unit: TimeUnit) -> f64 {
        f64::from_bits(self.rate.load(Ordering::Acquire)) * unit.as_nanos() as f64
    }

    pub fn clear(&self) {
        self.uncounted.store(0, Ordering::Release);
        self.rate.store(0f64.to_bits(), Ordering::Release);
        self.initialized.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TICK: Duration = Duration::from_secs(5);

    #[test]
    fn test_alpha_for_standard_windows() {
        let m1 = Ewma::one_minute(TICK);
        assert!((m1.alpha() - (1.0 - (-5.0f64 / 60.0).exp())).abs() < 1e-12);
        let m15 = Ewma::fifteen_minutes(TICK);
        assert!(m15.alpha() < Ewma::five_minutes(TICK).alpha());
        assert!(m15.alpha() < m1.alpha());
    }

    #[test]
    fn test_first_tick_sets_rate_directly() {
        let ewma = Ewma::one_minute(TICK);
        ewma.update(3);
        assert_eq!(ewma.rate(TimeUnit::Seconds), 0.0);

        ewma.tick();
        assert!((ewma.rate(TimeUnit::Seconds) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_decays_without_events() {
        let ewma = Ewma::one_minute(TICK);
        ewma.update(3);
        ewma.tick();

        ewma.tick();
        let expected = 0.6 * (1.0 - ewma.alpha());
        assert!((ewma.rate(TimeUnit::Seconds) - expected).abs() < 1e-9);

        // 12 ticks = one minute: one e-folding
        for _ in 0..11 {
            ewma.tick();
        }
        assert!((ewma.rate(TimeUnit::Seconds) - 0.6 * (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_converges_to_steady_rate() {
        let ewma = Ewma::fifteen_minutes(TICK);
        ewma.update(1);
        ewma.tick();

        // 20 events per second
        for _ in 0..6_000 {
            ewma.update(100);
            ewma.tick();
        }
        assert!((ewma.rate(TimeUnit::Seconds) - 20.0).abs() < 1e-6);
        assert!((ewma.rate(TimeUnit::Minutes) - 1_200.0).abs() < 1e-4);
    }

    #[test]
    fn test_clear_rebootstraps() {
        let ewma = Ewma::one_minute(TICK);
        ewma.update(50);
        ewma.tick();
        ewma.clear();
        assert_eq!(ewma.rate(TimeUnit::Seconds), 0.0);

        ewma.update(5);
        ewma.tick();
        assert!((ewma.rate(TimeUnit::Seconds) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_ticks_all_blend() {
        let ewma = Arc::new(Ewma::one_minute(TICK));
        ewma.update(1_000);
        ewma.tick();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ewma = Arc::clone(&ewma);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        ewma.tick();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // With no new events every tick decays by the same factor, so the
        // order of ticks does not matter, only that none were lost.
        let expected = Ewma::one_minute(TICK);
        expected.update(1_000);
        for _ in 0..4_001 {
            expected.tick();
        }
        assert_eq!(ewma.rate(TimeUnit::Seconds), expected.rate(TimeUnit::Seconds));
    }
}
