use serde::Serialize;

use crate::error::{InstrumentError, Result};

/// Immutable, sorted copy of a reservoir's values at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    values: Vec<f64>,
}

impl Snapshot {
    /// Sorts `values` once; the caller's reservoir is never touched.
    pub fn new(mut values: Vec<f64>) -> Self {
        values.sort_unstable_by(f64::total_cmp);
        Self { values }
    }

    pub fn from_longs<I: IntoIterator<Item = i64>>(values: I) -> Self {
        Self::new(values.into_iter().map(|v| v as f64).collect())
    }

    /// Value at `quantile` in [0, 1], interpolating between neighbours.
    /// An empty snapshot answers 0.0 for every valid quantile.
    pub fn value(&self, quantile: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&quantile) {
            return Err(InstrumentError::InvalidQuantile(quantile));
        }
        if self.values.is_empty() {
            return Ok(0.0);
        }

        let n = self.values.len();
        let pos = quantile * (n as f64 + 1.0);

        if pos < 1.0 {
            return Ok(self.values[0]);
        }
        if pos >= n as f64 {
            return Ok(self.values[n - 1]);
        }

        let lower = self.values[pos as usize - 1];
        let upper = self.values[pos as usize];
        Ok(lower + (pos - pos.floor()) * (upper - lower))
    }

    // Fixed quantiles are always in range.
    fn fixed(&self, quantile: f64) -> f64 {
        self.value(quantile).unwrap_or(0.0)
    }

    pub fn median(&self) -> f64 {
        self.fixed(0.5)
    }

    pub fn p75(&self) -> f64 {
        self.fixed(0.75)
    }

    pub fn p95(&self) -> f64 {
        self.fixed(0.95)
    }

    pub fn p98(&self) -> f64 {
        self.fixed(0.98)
    }

    pub fn p99(&self) -> f64 {
        self.fixed(0.99)
    }

    pub fn p999(&self) -> f64 {
        self.fixed(0.999)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn min(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}

/// A complete percentile breakdown of one snapshot.
/// Serializes straight into report lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PercentileSet {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p98: f64,
    pub p99: f64,
    pub p999: f64,
}

impl PercentileSet {
    /// Zeroed values if the snapshot is empty.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        if snapshot.is_empty() {
            return Self::empty();
        }

        Self {
            count: snapshot.len(),
            min: snapshot.min(),
            max: snapshot.max(),
            mean: snapshot.mean(),
            p50: snapshot.median(),
            p75: snapshot.p75(),
            p95: snapshot.p95(),
            p98: snapshot.p98(),
            p99: snapshot.p99(),
            p999: snapshot.p999(),
        }
    }

    /// All-zero placeholder used before any samples are recorded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_to_hundred() -> Snapshot {
        Snapshot::from_longs((1..=100).rev())
    }

    #[test]
    fn test_interpolated_median() {
        let snapshot = one_to_hundred();
        assert!((snapshot.value(0.5).unwrap() - 50.5).abs() < 1e-9);
        assert!((snapshot.median() - 50.5).abs() < 1e-9);
    }

    #[test]
    fn test_extremes() {
        let snapshot = one_to_hundred();
        assert_eq!(snapshot.value(0.0).unwrap(), 1.0);
        assert_eq!(snapshot.value(1.0).unwrap(), 100.0);
        assert_eq!(snapshot.p999(), 100.0);
        assert_eq!(snapshot.min(), 1.0);
        assert_eq!(snapshot.max(), 100.0);
    }

    #[test]
    fn test_upper_percentiles() {
        let snapshot = one_to_hundred();
        // pos = 0.95 * 101 = 95.95 -> 95 + 0.95
        assert!((snapshot.p95() - 95.95).abs() < 1e-9);
        assert!((snapshot.p75() - 75.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot_is_zero() {
        let snapshot = Snapshot::default();
        for q in [0.0, 0.25, 0.5, 1.0] {
            assert_eq!(snapshot.value(q).unwrap(), 0.0);
        }
        assert_eq!(snapshot.mean(), 0.0);
        assert!(!PercentileSet::from_snapshot(&snapshot).has_data());
    }

    #[test]
    fn test_invalid_quantile() {
        let snapshot = one_to_hundred();
        assert!(matches!(snapshot.value(-0.1), Err(InstrumentError::InvalidQuantile(_))));
        assert!(matches!(snapshot.value(1.1), Err(InstrumentError::InvalidQuantile(_))));
        assert!(snapshot.value(f64::NAN).is_err());
        assert!(Snapshot::default().value(1.5).is_err());
    }

    #[test]
    fn test_single_value() {
        let snapshot = Snapshot::from_longs([7]);
        assert_eq!(snapshot.median(), 7.0);
        assert_eq!(snapshot.value(0.01).unwrap(), 7.0);
    }

    #[test]
    fn test_percentile_set() {
        let set = PercentileSet::from_snapshot(&one_to_hundred());
        assert_eq!(set.count, 100);
        assert!((set.mean - 50.5).abs() < 1e-9);
        assert!((set.p50 - 50.5).abs() < 1e-9);
    }
}
