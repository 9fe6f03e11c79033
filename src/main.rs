use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

use rust_instrument::{
    ExportError, FactSet, InstrumentConfig, Instrumentation, IntervalTicker, Metric, MetricExporter, MetricFact,
    MetricKey, MetricRegistry, Metrics, TimeUnit, Ticker, TracingSink,
};

mod load_generator;
mod report;

use load_generator::{LoadConfig, Workload};

/// Logs each metric the first time the registry builds it.
struct LogExporter;

impl MetricExporter for LogExporter {
    fn export(&self, key: &MetricKey, metric: &Metric) -> Result<(), ExportError> {
        tracing::info!(key = %key, kind = %metric.kind(), "metric registered");
        Ok(())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   📈  INSTRUMENT BENCH                           ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Configuration ─────────────────────────────────────────
    let config = InstrumentConfig::from_env()?;
    let load = LoadConfig::from_env()?;
    tracing::info!(
        domain = %config.domain,
        sample = %config.sample,
        duration_unit = %config.duration_unit,
        workers = load.concurrency,
        duration_secs = load.duration_secs,
        "starting"
    );

    // ── 2. Registry, ticker and instruments ──────────────────────
    let ticker: Arc<dyn Ticker> = Arc::new(IntervalTicker::new()?);
    let registry = Arc::new(MetricRegistry::with_exporter(Arc::new(LogExporter)));
    let instrumentation = Instrumentation::new(config.clone(), registry.clone(), ticker.clone())?;

    let payload = registry.instrument(
        &Metrics::speedometer(config.tick_interval_secs, TimeUnit::Seconds, ticker.clone()),
        instrumentation.key("payload.bytes", []),
    )?;
    let errors = registry.instrument(&Metrics::tally(0), instrumentation.key("op.errors", []))?;
    let workload = Arc::new(Workload::register(&instrumentation, payload, errors)?);

    let slow = FactSet::empty().with(MetricFact::Max).with(MetricFact::P99);
    workload
        .writes
        .set_context_sink(Some(Arc::new(TracingSink::new("op.latency[write]", slow))));

    // ── 3. Run workers and the periodic report ───────────────────
    let running = Arc::new(AtomicBool::new(true));
    let started = Instant::now();

    let reporter = tokio::spawn(report::report_while(
        running.clone(),
        workload.clone(),
        Duration::from_millis(500),
    ));
    load_generator::run(running, workload.clone(), load).await;
    let _ = reporter.await;

    // ── 4. Final summary ─────────────────────────────────────────
    registry.stop_all();
    let summary = report::summarize(&workload, started);
    println!();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    for key in registry.keys() {
        println!("  registered  {key}");
    }
    println!();

    Ok(())
}
