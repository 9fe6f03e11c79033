//! Instrumentation configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{InstrumentError, Result};
use crate::metrics::SampleKind;
use crate::time::TimeUnit;

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    /// When false, convenience instrumentation records nothing
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Group used for keys built by [`Instrumentation`](crate::Instrumentation)
    #[serde(default = "default_domain")]
    pub domain: String,

    /// How often meters advance their moving averages (seconds)
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_sample")]
    pub sample: SampleKind,

    #[serde(default = "default_reservoir_size")]
    pub reservoir_size: usize,

    /// Decay factor for biased samples
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    #[serde(default = "default_duration_unit")]
    pub duration_unit: TimeUnit,
}

fn default_enabled() -> bool {
    true
}
fn default_domain() -> String {
    "instrument".to_string()
}
fn default_tick_interval_secs() -> u64 {
    5
}
fn default_sample() -> SampleKind {
    SampleKind::Biased
}
fn default_reservoir_size() -> usize {
    SampleKind::DEFAULT_SIZE
}
fn default_alpha() -> f64 {
    SampleKind::DEFAULT_ALPHA
}
fn default_duration_unit() -> TimeUnit {
    TimeUnit::Milliseconds
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            domain: default_domain(),
            tick_interval_secs: default_tick_interval_secs(),
            sample: default_sample(),
            reservoir_size: default_reservoir_size(),
            alpha: default_alpha(),
            duration_unit: default_duration_unit(),
        }
    }
}

impl InstrumentConfig {
    /// Reads `INSTRUMENT_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            enabled: var("INSTRUMENT_ENABLED", defaults.enabled, parse_bool)?,
            domain: env::var("INSTRUMENT_DOMAIN").unwrap_or(defaults.domain),
            tick_interval_secs: var("INSTRUMENT_TICK_SECS", defaults.tick_interval_secs, FromStr::from_str)?,
            sample: var("INSTRUMENT_SAMPLE", defaults.sample, FromStr::from_str)?,
            reservoir_size: var("INSTRUMENT_RESERVOIR_SIZE", defaults.reservoir_size, FromStr::from_str)?,
            alpha: var("INSTRUMENT_ALPHA", defaults.alpha, FromStr::from_str)?,
            duration_unit: var("INSTRUMENT_DURATION_UNIT", defaults.duration_unit, FromStr::from_str)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(InstrumentError::Config(
                "tick_interval_secs must be at least 1".into(),
            ));
        }
        if self.reservoir_size == 0 {
            return Err(InstrumentError::Config(
                "reservoir_size must be at least 1".into(),
            ));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(InstrumentError::Config(format!(
                "alpha must be positive and finite, got {}",
                self.alpha
            )));
        }
        if self.domain.is_empty() {
            return Err(InstrumentError::Config("domain must not be empty".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

fn parse_bool(s: &str) -> std::result::Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("expected a boolean, got \"{other}\"")),
    }
}

fn var<T, E: std::fmt::Display>(
    name: &str,
    default: T,
    parse: impl Fn(&str) -> std::result::Result<T, E>,
) -> Result<T> {
    match env::var(name) {
        Ok(raw) => parse(raw.trim())
            .map_err(|e| InstrumentError::Config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}
