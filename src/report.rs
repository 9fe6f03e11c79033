use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram as HdrHistogram;
use serde::Serialize;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use rust_instrument::{Chronometer, PercentileSet, Speedometer};

use crate::load_generator::Workload;

// ─── Summary types ───────────────────────────────────────────────

/// Latency and throughput of one operation type.
#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    pub count: u64,
    pub latency: PercentileSet,
    pub one_minute_rate: f64,
    pub mean_rate: f64,
}

/// Payload throughput as seen by the speedometer.
#[derive(Debug, Clone, Serialize)]
pub struct PayloadSummary {
    pub events: u64,
    pub total_bytes: u64,
    pub min_bytes: u64,
    pub max_bytes: u64,
    pub one_minute_velocity: f64,
    pub average_velocity: f64,
}

/// Everything logged on each report tick.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub elapsed_secs: f64,
    pub reads: OperationSummary,
    pub writes: OperationSummary,
    pub payload: PayloadSummary,
    pub errors: i64,

    /// Exact distribution of every recorded latency (both operations)
    pub exact: PercentileSet,
}

impl OperationSummary {
    fn of(chronometer: &Chronometer) -> Self {
        Self {
            count: chronometer.count(),
            latency: chronometer.percentiles(),
            one_minute_rate: chronometer.one_minute_rate(),
            mean_rate: finite_or_zero(chronometer.average_rate()),
        }
    }
}

impl PayloadSummary {
    fn of(speedometer: &Speedometer) -> Self {
        Self {
            events: speedometer.count(),
            total_bytes: speedometer.total(),
            min_bytes: speedometer.min(),
            max_bytes: speedometer.max(),
            one_minute_velocity: finite_or_zero(speedometer.one_minute_velocity()),
            average_velocity: finite_or_zero(speedometer.average_velocity()),
        }
    }
}

/// JSON has no NaN; velocities are undefined until the first tick and the
/// mean rate until time has passed.
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Same shape as the reservoir-backed sets, read from the exact histogram.
pub fn exact_percentiles(hist: &HdrHistogram<u64>) -> PercentileSet {
    if hist.len() == 0 {
        return PercentileSet::empty();
    }

    PercentileSet {
        count: hist.len() as usize,
        min: hist.min() as f64,
        max: hist.max() as f64,
        mean: hist.mean(),
        p50: hist.value_at_quantile(0.5) as f64,
        p75: hist.value_at_quantile(0.75) as f64,
        p95: hist.value_at_quantile(0.95) as f64,
        p98: hist.value_at_quantile(0.98) as f64,
        p99: hist.value_at_quantile(0.99) as f64,
        p999: hist.value_at_quantile(0.999) as f64,
    }
}

pub fn summarize(workload: &Workload, started: Instant) -> Summary {
    Summary {
        elapsed_secs: started.elapsed().as_secs_f64(),
        reads: OperationSummary::of(&workload.reads),
        writes: OperationSummary::of(&workload.writes),
        payload: PayloadSummary::of(&workload.payload),
        errors: workload.errors.count(),
        exact: exact_percentiles(&workload.exact.lock()),
    }
}

// ─── Periodic report ─────────────────────────────────────────────

/// Logs a JSON summary every `every` while `running` holds.
pub async fn report_while(running: Arc<AtomicBool>, workload: Arc<Workload>, every: Duration) {
    let started = Instant::now();
    let mut ticks = IntervalStream::new(tokio::time::interval(every));

    while ticks.next().await.is_some() {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        let summary = summarize(&workload, started);
        match serde_json::to_string(&summary) {
            Ok(json) => tracing::info!(summary = %json, "progress"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize summary"),
        }
    }
}
