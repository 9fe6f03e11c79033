pub mod chronometer;
pub mod ewma;
pub mod histogram;
pub mod meter;
pub mod sample;
pub mod snapshot;
pub mod speedometer;
pub mod tally;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

pub use chronometer::Chronometer;
pub use ewma::Ewma;
pub use histogram::Histogram;
pub use meter::{Meter, RateWindow};
pub use sample::{ExponentiallyDecayingSample, Sample, SampleKind, UniformSample};
pub use snapshot::{PercentileSet, Snapshot};
pub use speedometer::Speedometer;
pub use tally::Tally;

use crate::context::ContextSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Tally,
    Histogram,
    Meter,
    Chronometer,
    Speedometer,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tally => "tally",
            Self::Histogram => "histogram",
            Self::Meter => "meter",
            Self::Chronometer => "chronometer",
            Self::Speedometer => "speedometer",
        })
    }
}

/// A constructed metric as held by the registry.
#[derive(Debug, Clone)]
pub enum Metric {
    Tally(Arc<Tally>),
    Histogram(Arc<Histogram>),
    Meter(Arc<Meter>),
    Chronometer(Arc<Chronometer>),
    Speedometer(Arc<Speedometer>),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Tally(_) => MetricKind::Tally,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Meter(_) => MetricKind::Meter,
            Self::Chronometer(_) => MetricKind::Chronometer,
            Self::Speedometer(_) => MetricKind::Speedometer,
        }
    }

    /// Cancels tick subscriptions of rate-tracking metrics.
    pub fn stop(&self) {
        match self {
            Self::Meter(m) => m.stop(),
            Self::Chronometer(c) => c.stop(),
            Self::Speedometer(s) => s.stop(),
            Self::Tally(_) | Self::Histogram(_) => {}
        }
    }

    pub fn clear(&self) {
        match self {
            Self::Tally(t) => t.clear(),
            Self::Histogram(h) => h.clear(),
            Self::Meter(m) => m.clear(),
            Self::Chronometer(c) => c.clear(),
            Self::Speedometer(s) => s.clear(),
        }
    }

    pub fn set_context_sink(&self, sink: Option<Arc<dyn ContextSink>>) {
        match self {
            Self::Tally(t) => t.set_context_sink(sink),
            Self::Histogram(h) => h.set_context_sink(sink),
            Self::Meter(m) => m.set_context_sink(sink),
            Self::Chronometer(c) => c.set_context_sink(sink),
            Self::Speedometer(s) => s.set_context_sink(sink),
        }
    }

    /// True when both handles point at the same instance.
    pub fn same_instance(&self, other: &Metric) -> bool {
        match (self, other) {
            (Self::Tally(a), Self::Tally(b)) => Arc::ptr_eq(a, b),
            (Self::Histogram(a), Self::Histogram(b)) => Arc::ptr_eq(a, b),
            (Self::Meter(a), Self::Meter(b)) => Arc::ptr_eq(a, b),
            (Self::Chronometer(a), Self::Chronometer(b)) => Arc::ptr_eq(a, b),
            (Self::Speedometer(a), Self::Speedometer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Concrete metric types that the registry can hand back typed.
pub trait Instrument: Send + Sync + Sized + 'static {
    const KIND: MetricKind;

    fn into_metric(this: Arc<Self>) -> Metric;

    fn from_metric(metric: &Metric) -> Option<Arc<Self>>;
}

macro_rules! instrument {
    ($ty:ident) => {
        impl Instrument for $ty {
            const KIND: MetricKind = MetricKind::$ty;

            fn into_metric(this: Arc<Self>) -> Metric {
                Metric::$ty(this)
            }

            fn from_metric(metric: &Metric) -> Option<Arc<Self>> {
                match metric {
                    Metric::$ty(inner) => Some(Arc::clone(inner)),
                    _ => None,
                }
            }
        }
    };
}

instrument!(Tally);
instrument!(Histogram);
instrument!(Meter);
instrument!(Chronometer);
instrument!(Speedometer);
