use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram as HdrHistogram;
use parking_lot::Mutex;

use rust_instrument::{
    Chronometer, InstrumentError, Instrumentation, MetricProperty, Result, Speedometer, Tally, TimeUnit,
};

// ─── Configuration ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Number of concurrent workers
    pub concurrency: u32,

    /// How long the run lasts
    pub duration_secs: u64,

    /// Percentage of operations that are reads (0–100)
    pub read_pct: u8,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            duration_secs: 10,
            read_pct: 80,
        }
    }
}

impl LoadConfig {
    /// Reads `BENCH_CONCURRENCY`, `BENCH_DURATION_SECS` and `BENCH_READ_PCT`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            concurrency: parse_var("BENCH_CONCURRENCY", defaults.concurrency)?,
            duration_secs: parse_var("BENCH_DURATION_SECS", defaults.duration_secs)?,
            read_pct: parse_var("BENCH_READ_PCT", defaults.read_pct)?,
        };

        if config.concurrency == 0 || config.read_pct > 100 {
            return Err(InstrumentError::Config(format!(
                "concurrency must be positive and read_pct at most 100, got {} and {}",
                config.concurrency, config.read_pct
            )));
        }
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| InstrumentError::Config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

// ─── Instruments shared by every worker ──────────────────────────

/// The registry-backed metrics the workers feed, plus an exact
/// HdrHistogram of the same latencies for comparison.
pub struct Workload {
    pub reads: Arc<Chronometer>,
    pub writes: Arc<Chronometer>,
    pub payload: Arc<Speedometer>,
    pub errors: Arc<Tally>,
    pub exact: Mutex<HdrHistogram<u64>>,
}

impl Workload {
    pub fn register(instrumentation: &Instrumentation, speedometer: Arc<Speedometer>, errors: Arc<Tally>) -> Result<Self> {
        let chronometer = |op: &str| -> Result<Arc<Chronometer>> {
            instrumentation
                .chronometer("op.latency", [MetricProperty::new("op", op)])?
                .ok_or_else(|| InstrumentError::Config("instrumentation is disabled".into()))
        };

        // 1 unit → 60 s, 3 significant figures
        let exact = HdrHistogram::new_with_bounds(1, 60_000_000, 3)
            .map_err(|e| InstrumentError::Config(format!("hdrhistogram: {e}")))?;

        Ok(Self {
            reads: chronometer("read")?,
            writes: chronometer("write")?,
            payload: speedometer,
            errors,
            exact: Mutex::new(exact),
        })
    }
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that generate synthetic operations
/// until the deadline or the `running` flag is set to false.
pub async fn run(running: Arc<AtomicBool>, workload: Arc<Workload>, config: LoadConfig) {
    let deadline = Instant::now() + Duration::from_secs(config.duration_secs);

    let read_pct = config.read_pct;
    let mut handles = Vec::with_capacity(config.concurrency as usize);

    for worker_id in 0..config.concurrency {
        let running = running.clone();
        let workload = workload.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, running, workload, deadline, read_pct).await;
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    running.store(false, Ordering::SeqCst);
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(id: u32, running: Arc<AtomicBool>, workload: Arc<Workload>, deadline: Instant, read_pct: u8) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let is_read = rng.gen_range(0u8..100) < read_pct;
        operation(&mut rng, &workload, is_read);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Synthetic latency in microseconds: mostly fast, with a slow tail.
fn synthetic_latency_us(rng: &mut StdRng, is_read: bool) -> i64 {
    let base = if is_read {
        rng.gen_range(150..1_200)
    } else {
        rng.gen_range(400..3_000)
    };
    if rng.gen_bool(0.01) {
        base * rng.gen_range(10..40)
    } else {
        base
    }
}

fn operation(rng: &mut StdRng, workload: &Workload, is_read: bool) {
    let latency_us = synthetic_latency_us(rng, is_read);
    let chronometer = if is_read { &workload.reads } else { &workload.writes };

    if let Err(e) = chronometer.update_in(latency_us, TimeUnit::Microseconds) {
        tracing::warn!(error = %e, "failed to record latency");
    }
    let recorded = chronometer.duration_unit().convert(latency_us, TimeUnit::Microseconds);
    workload.exact.lock().saturating_record(recorded.max(0) as u64);

    let payload = if is_read {
        rng.gen_range(64..16_384)
    } else {
        rng.gen_range(256..4_096)
    };
    workload.payload.update(payload);

    if rng.gen_bool(0.005) {
        workload.errors.inc();
    }
}
