use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rust_instrument::{
    ExportError, InstrumentError, Metric, MetricBuilder, MetricExporter, MetricKey, MetricKind, MetricProperty,
    MetricRegistry, Metrics, SampleKind, Tally,
};

/// Counts how often the registry asks it to build.
struct CountingBuilder {
    constructed: AtomicUsize,
}

impl MetricBuilder for CountingBuilder {
    type Output = Tally;

    fn construct(&self) -> Tally {
        self.constructed.fetch_add(1, Ordering::SeqCst);
        Tally::new(0)
    }
}

struct FailingExporter {
    calls: AtomicUsize,
}

impl MetricExporter for FailingExporter {
    fn export(&self, _key: &MetricKey, _metric: &Metric) -> Result<(), ExportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("management server unavailable".into())
    }
}

#[test]
fn test_concurrent_first_access_constructs_once() {
    const THREADS: usize = 16;

    let registry = Arc::new(MetricRegistry::new());
    let builder = Arc::new(CountingBuilder {
        constructed: AtomicUsize::new(0),
    });
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = registry.clone();
            let builder = builder.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let tally = registry
                    .instrument(&*builder, MetricKey::simple("app", "hits"))
                    .unwrap();
                tally.inc();
                tally
            })
        })
        .collect();

    let tallies: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(builder.constructed.load(Ordering::SeqCst), 1);
    assert!(tallies.iter().all(|t| Arc::ptr_eq(t, &tallies[0])));
    assert_eq!(tallies[0].count(), THREADS as i64);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_distinct_keys_construct_separately() {
    let registry = MetricRegistry::new();
    let builder = CountingBuilder {
        constructed: AtomicUsize::new(0),
    };

    let find = MetricKey::new("db", "query", [MetricProperty::new("method", "find")]);
    let save = MetricKey::new("db", "query", [MetricProperty::new("method", "save")]);
    let a = registry.instrument(&builder, find.clone()).unwrap();
    let b = registry.instrument(&builder, save).unwrap();
    let again = registry.instrument(&builder, find).unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &again));
    assert_eq!(builder.constructed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_export_failure_keeps_metric_installed() {
    let exporter = Arc::new(FailingExporter {
        calls: AtomicUsize::new(0),
    });
    let registry = MetricRegistry::with_exporter(exporter.clone());
    let key = MetricKey::simple("app", "latency");

    let err = registry
        .instrument(&Metrics::histogram(SampleKind::Uniform), key.clone())
        .unwrap_err();
    assert!(matches!(err, InstrumentError::Export { .. }));
    assert_eq!(err.error_code(), "EXPORT_ERROR");

    // Installed despite the failure; the exporter is not asked again.
    let histogram = registry
        .instrument(&Metrics::histogram(SampleKind::Uniform), key.clone())
        .unwrap();
    histogram.update(5);
    assert_eq!(registry.get(&key).map(|m| m.kind()), Some(MetricKind::Histogram));
    assert_eq!(exporter.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_metrics_listing_is_ordered() {
    let registry = MetricRegistry::new();
    registry
        .instrument(&Metrics::tally(1), MetricKey::simple("web", "requests"))
        .unwrap();
    registry
        .instrument(&Metrics::histogram(SampleKind::Biased), MetricKey::simple("db", "rows"))
        .unwrap();

    let listed = registry.metrics();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].0.to_string(), "db:name=rows");
    assert_eq!(listed[0].1.kind(), MetricKind::Histogram);
    assert_eq!(listed[1].0.to_string(), "web:name=requests");
}
