//! In-process statistical instrumentation.
//!
//! Metrics (tallies, histograms, meters, chronometers and speedometers) are
//! safe to update from any number of threads and are looked up by
//! [`MetricKey`] in a [`MetricRegistry`] that constructs each one at most
//! once. Rate-tracking metrics advance their moving averages from an
//! injectable [`Ticker`].

pub mod builders;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod instrumentation;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod ticker;
pub mod time;

pub use builders::{MetricBuilder, Metrics};
pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use config::InstrumentConfig;
pub use context::{CollectingSink, ContextSink, FactSet, MetricFact, MetricItem, MetricValue, TracingSink};
pub use error::{ExportError, InstrumentError, Result};
pub use instrumentation::Instrumentation;
pub use key::{MetricKey, MetricProperty};
pub use metrics::{
    Chronometer, Ewma, Histogram, Instrument, Meter, Metric, MetricKind, PercentileSet, RateWindow,
    Sample, SampleKind, Snapshot, Speedometer, Tally,
};
pub use registry::{MetricExporter, MetricRegistry};
pub use ticker::{IntervalTicker, ManualTicker, TickSubscription, Tickable, Ticker};
pub use time::TimeUnit;
