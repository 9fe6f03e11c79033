//! Keyed, construct-once metric registry.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::builders::MetricBuilder;
use crate::error::{ExportError, InstrumentError, Result};
use crate::key::MetricKey;
use crate::metrics::{Instrument, Metric};

/// Publishes newly constructed metrics to some outside system.
pub trait MetricExporter: Send + Sync {
    fn export(&self, key: &MetricKey, metric: &Metric) -> std::result::Result<(), ExportError>;
}

/// Maps keys to metrics, constructing each metric at most once.
///
/// Lookups of existing keys only touch the map. A miss takes a registry-wide
/// construction lock, checks again and builds; concurrent first callers for
/// the same key all get the single instance that was installed.
pub struct MetricRegistry {
    metrics: DashMap<MetricKey, Metric>,
    construction: Mutex<()>,
    exporter: Option<Arc<dyn MetricExporter>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
            construction: Mutex::new(()),
            exporter: None,
        }
    }

    pub fn with_exporter(exporter: Arc<dyn MetricExporter>) -> Self {
        Self {
            exporter: Some(exporter),
            ..Self::new()
        }
    }

    /// Returns the metric under `key`, building it with `builder` if absent.
    ///
    /// Fails with `KindMismatch` if the key holds a different kind of metric,
    /// and with `Export` if the exporter rejects a new metric. In the latter
    /// case the metric stays registered and later calls return it.
    pub fn instrument<B: MetricBuilder>(&self, builder: &B, key: MetricKey) -> Result<Arc<B::Output>> {
        if let Some(existing) = self.metrics.get(&key) {
            return typed::<B::Output>(&key, existing.value());
        }

        let metric = {
            let _guard = self.construction.lock();

            if let Some(existing) = self.metrics.get(&key) {
                return typed::<B::Output>(&key, existing.value());
            }

            let metric = B::Output::into_metric(Arc::new(builder.construct()));
            self.metrics.insert(key.clone(), metric.clone());
            tracing::debug!(key = %key, kind = %metric.kind(), "metric constructed");
            metric
        };

        if let Some(exporter) = &self.exporter {
            if let Err(source) = exporter.export(&key, &metric) {
                tracing::warn!(key = %key, error = %source, "metric export failed");
                return Err(InstrumentError::Export {
                    key: key.to_string(),
                    source,
                });
            }
        }

        typed::<B::Output>(&key, &metric)
    }

    pub fn get(&self, key: &MetricKey) -> Option<Metric> {
        self.metrics.get(key).map(|entry| entry.value().clone())
    }

    /// Typed lookup without construction.
    pub fn get_as<M: Instrument>(&self, key: &MetricKey) -> Result<Option<Arc<M>>> {
        match self.metrics.get(key) {
            Some(entry) => typed::<M>(key, entry.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Unregisters and stops the metric under `key`.
    pub fn remove(&self, key: &MetricKey) -> Option<Metric> {
        let (_, metric) = self.metrics.remove(key)?;
        metric.stop();
        tracing::debug!(key = %key, "metric removed");
        Some(metric)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Registered keys in hierarchical order.
    pub fn keys(&self) -> Vec<MetricKey> {
        let mut keys: Vec<_> = self.metrics.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Every registered metric in key order.
    pub fn metrics(&self) -> Vec<(MetricKey, Metric)> {
        let mut metrics: Vec<_> = self
            .metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        metrics.sort_by(|a, b| a.0.cmp(&b.0));
        metrics
    }

    /// Stops every rate-tracking metric; the metrics stay registered.
    pub fn stop_all(&self) {
        for entry in self.metrics.iter() {
            entry.value().stop();
        }
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.metrics.len())
            .field("exporter", &self.exporter.is_some())
            .finish()
    }
}

fn typed<M: Instrument>(key: &MetricKey, metric: &Metric) -> Result<Arc<M>> {
    M::from_metric(metric).ok_or_else(|| InstrumentError::KindMismatch {
        key: key.to_string(),
        expected: M::KIND,
        found: metric.kind(),
    })
}
