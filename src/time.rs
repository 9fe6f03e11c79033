//! Time units used for durations, tick intervals and rates.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Length of one unit in nanoseconds.
    pub const fn as_nanos(self) -> u64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
            Self::Minutes => 60_000_000_000,
            Self::Hours => 3_600_000_000_000,
            Self::Days => 86_400_000_000_000,
        }
    }

    /// Converts `value` expressed in `from` into this unit, truncating toward zero.
    pub fn convert(self, value: i64, from: TimeUnit) -> i64 {
        let nanos = value as i128 * from.as_nanos() as i128;
        let converted = nanos / self.as_nanos() as i128;

        converted.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Same as [`convert`](Self::convert) without truncation.
    pub fn convert_f64(self, value: f64, from: TimeUnit) -> f64 {
        value * (from.as_nanos() as f64 / self.as_nanos() as f64)
    }

    pub fn to_duration(self, value: u64) -> Duration {
        Duration::from_nanos(value.saturating_mul(self.as_nanos()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "nanoseconds",
            Self::Microseconds => "microseconds",
            Self::Milliseconds => "milliseconds",
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ns" | "nanoseconds" => Ok(Self::Nanoseconds),
            "us" | "microseconds" => Ok(Self::Microseconds),
            "ms" | "milliseconds" => Ok(Self::Milliseconds),
            "s" | "seconds" => Ok(Self::Seconds),
            "m" | "minutes" => Ok(Self::Minutes),
            "h" | "hours" => Ok(Self::Hours),
            "d" | "days" => Ok(Self::Days),
            other => Err(format!("unknown time unit \"{other}\"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_truncates() {
        assert_eq!(TimeUnit::Seconds.convert(2_500, TimeUnit::Milliseconds), 2);
        assert_eq!(TimeUnit::Microseconds.convert(3, TimeUnit::Milliseconds), 3_000);
        assert_eq!(TimeUnit::Nanoseconds.convert(i64::MAX, TimeUnit::Days), i64::MAX);
    }

    #[test]
    fn test_convert_f64() {
        let per_second = TimeUnit::Seconds.convert_f64(1.0, TimeUnit::Minutes);
        assert!((per_second - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse() {
        assert_eq!("ms".parse::<TimeUnit>(), Ok(TimeUnit::Milliseconds));
        assert_eq!("Seconds".parse::<TimeUnit>(), Ok(TimeUnit::Seconds));
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }
}
