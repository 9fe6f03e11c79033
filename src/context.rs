//! Structured-context records emitted by metrics on every update.
//!
//! A metric with a [`ContextSink`] installed reports the aggregate values
//! that resulted from each `update`/`mark` call. The sink decides which
//! [`MetricFact`]s it cares about; facts it does not trace are never computed.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFact {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    StdDev,
    Median,
    P75,
    P95,
    P98,
    P99,
    P999,
    M1Avg,
    M5Avg,
    M15Avg,
    AvgRate,
    Velocity,
}

impl MetricFact {
    pub const ALL: [MetricFact; 17] = [
        Self::Count,
        Self::Sum,
        Self::Min,
        Self::Max,
        Self::Avg,
        Self::StdDev,
        Self::Median,
        Self::P75,
        Self::P95,
        Self::P98,
        Self::P99,
        Self::P999,
        Self::M1Avg,
        Self::M5Avg,
        Self::M15Avg,
        Self::AvgRate,
        Self::Velocity,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::StdDev => "std dev",
            Self::Median => "median",
            Self::P75 => "75th pctl",
            Self::P95 => "95th pctl",
            Self::P98 => "98th pctl",
            Self::P99 => "99th pctl",
            Self::P999 => "999th pctl",
            Self::M1Avg => "1 min avg",
            Self::M5Avg => "5 min avg",
            Self::M15Avg => "15 min avg",
            Self::AvgRate => "avg rate",
            Self::Velocity => "velocity",
        }
    }

    const fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// A set of facts, cheap to copy and test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactSet(u32);

impl FactSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        MetricFact::ALL.into_iter().collect()
    }

    pub fn with(mut self, fact: MetricFact) -> Self {
        self.0 |= fact.bit();
        self
    }

    pub fn contains(self, fact: MetricFact) -> bool {
        self.0 & fact.bit() != 0
    }
}

impl FromIterator<MetricFact> for FactSet {
    fn from_iter<I: IntoIterator<Item = MetricFact>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    /// No observation yet, e.g. min/max right after a clear.
    Missing,
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        Self::Int(v.min(i64::MAX as u64) as i64)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.3}"),
            Self::Missing => f.write_str("n/a"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricItem {
    pub fact: MetricFact,
    pub name: &'static str,
    pub value: MetricValue,
}

/// Receives best-effort records of metric state after each mutation.
pub trait ContextSink: Send + Sync {
    fn will_trace(&self, fact: MetricFact) -> bool;

    fn record(&self, items: &[MetricItem]);
}

/// Forwards records to `tracing` at TRACE level.
#[derive(Debug, Clone)]
pub struct TracingSink {
    metric: String,
    facts: FactSet,
}

impl TracingSink {
    pub fn new(metric: impl Into<String>, facts: FactSet) -> Self {
        Self {
            metric: metric.into(),
            facts,
        }
    }
}

impl ContextSink for TracingSink {
    fn will_trace(&self, fact: MetricFact) -> bool {
        self.facts.contains(fact)
    }

    fn record(&self, items: &[MetricItem]) {
        for item in items {
            tracing::trace!(
                metric = %self.metric,
                fact = item.name,
                value = %item.value,
                "metric context"
            );
        }
    }
}

/// Collects the items one mutation reports, skipping untraced facts.
pub(crate) struct Items<'a> {
    sink: &'a dyn ContextSink,
    items: Vec<MetricItem>,
}

impl<'a> Items<'a> {
    pub(crate) fn new(sink: &'a dyn ContextSink) -> Self {
        Self {
            sink,
            items: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, fact: MetricFact, value: impl Into<MetricValue>) -> &mut Self {
        if self.sink.will_trace(fact) {
            self.items.push(MetricItem {
                fact,
                name: fact.label(),
                value: value.into(),
            });
        }
        self
    }

    /// Like `push`, but only evaluates `value` when the fact is traced.
    pub(crate) fn push_with<V: Into<MetricValue>>(
        &mut self,
        fact: MetricFact,
        value: impl FnOnce() -> V,
    ) -> &mut Self {
        if self.sink.will_trace(fact) {
            self.items.push(MetricItem {
                fact,
                name: fact.label(),
                value: value().into(),
            });
        }
        self
    }

    pub(crate) fn traces_any(&self, facts: &[MetricFact]) -> bool {
        facts.iter().any(|f| self.sink.will_trace(*f))
    }

    pub(crate) fn emit(self) {
        if !self.items.is_empty() {
            self.sink.record(&self.items);
        }
    }
}

/// An optional sink attached to one metric.
#[derive(Default)]
pub(crate) struct SinkSlot(RwLock<Option<Arc<dyn ContextSink>>>);

impl SinkSlot {
    pub(crate) fn get(&self) -> Option<Arc<dyn ContextSink>> {
        self.0.read().clone()
    }

    pub(crate) fn set(&self, sink: Option<Arc<dyn ContextSink>>) {
        *self.0.write() = sink;
    }
}

impl fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SinkSlot")
            .field(&self.0.read().is_some())
            .finish()
    }
}

/// Sink that keeps everything it receives; handy in tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    facts: FactSet,
    records: parking_lot::Mutex<Vec<Vec<MetricItem>>>,
}

impl CollectingSink {
    pub fn new(facts: FactSet) -> Self {
        Self {
            facts,
            records: Default::default(),
        }
    }

    pub fn records(&self) -> Vec<Vec<MetricItem>> {
        self.records.lock().clone()
    }

    /// The most recent value reported for `fact`.
    pub fn last(&self, fact: MetricFact) -> Option<MetricValue> {
        self.records
            .lock()
            .iter()
            .rev()
            .flat_map(|r| r.iter())
            .find(|item| item.fact == fact)
            .map(|item| item.value)
    }
}

impl ContextSink for CollectingSink {
    fn will_trace(&self, fact: MetricFact) -> bool {
        self.facts.contains(fact)
    }

    fn record(&self, items: &[MetricItem]) {
        self.records.lock().push(items.to_vec());
    }
}
