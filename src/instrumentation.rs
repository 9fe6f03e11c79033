//! Configuration-driven shortcuts for timing code with chronometers.

use std::sync::Arc;

use crate::builders::{ChronometerBuilder, Metrics};
use crate::clock::{system_clock, Clock};
use crate::config::InstrumentConfig;
use crate::error::Result;
use crate::key::{MetricKey, MetricProperty};
use crate::metrics::Chronometer;
use crate::registry::MetricRegistry;
use crate::ticker::Ticker;
use crate::time::TimeUnit;

/// Ties a registry, a ticker and a configuration together.
///
/// Keys are built from the configured domain, so callers only name the
/// metric and its properties. With `enabled = false` nothing is registered
/// or recorded.
#[derive(Debug, Clone)]
pub struct Instrumentation {
    config: InstrumentConfig,
    registry: Arc<MetricRegistry>,
    ticker: Arc<dyn Ticker>,
    clock: Arc<dyn Clock>,
}

impl Instrumentation {
    pub fn new(config: InstrumentConfig, registry: Arc<MetricRegistry>, ticker: Arc<dyn Ticker>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            ticker,
            clock: system_clock(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn key(&self, name: &str, properties: impl IntoIterator<Item = MetricProperty>) -> MetricKey {
        MetricKey::new(self.config.domain.as_str(), name, properties)
    }

    fn chronometer_builder(&self) -> ChronometerBuilder {
        Metrics::chronometer(
            self.config.duration_unit,
            self.config.tick_interval_secs,
            TimeUnit::Seconds,
            self.ticker.clone(),
        )
        .samples(self.config.sample)
        .reservoir(self.config.reservoir_size, self.config.alpha)
        .clock(self.clock.clone())
    }

    /// The chronometer for `name`, or `None` when instrumentation is off.
    pub fn chronometer(
        &self,
        name: &str,
        properties: impl IntoIterator<Item = MetricProperty>,
    ) -> Result<Option<Arc<Chronometer>>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let key = self.key(name, properties);
        self.registry
            .instrument(&self.chronometer_builder(), key)
            .map(Some)
    }

    /// Records an already measured duration.
    pub fn instrument_with_chronometer(
        &self,
        name: &str,
        duration: i64,
        unit: TimeUnit,
        properties: impl IntoIterator<Item = MetricProperty>,
    ) -> Result<()> {
        match self.chronometer(name, properties)? {
            Some(chronometer) => chronometer.update_in(duration, unit),
            None => Ok(()),
        }
    }

    /// Runs `f` under a chronometer. On a registry error `f` is not run.
    pub fn time_with_chronometer<R>(
        &self,
        name: &str,
        properties: impl IntoIterator<Item = MetricProperty>,
        f: impl FnOnce() -> R,
    ) -> Result<R> {
        Ok(match self.chronometer(name, properties)? {
            Some(chronometer) => chronometer.time(f),
            None => f(),
        })
    }
}
