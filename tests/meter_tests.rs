use std::sync::Arc;
use std::time::Duration;

use rust_instrument::{
    CollectingSink, FactSet, IntervalTicker, ManualClock, ManualTicker, Meter, MetricFact, MetricKey, MetricRegistry,
    MetricValue, Metrics, RateWindow, SampleKind, TimeUnit,
};

#[tokio::test(start_paused = true)]
async fn test_meter_on_interval_ticker() {
    let ticker = IntervalTicker::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let meter = Meter::new(5, TimeUnit::Seconds, clock, &ticker);
    assert_eq!(ticker.active(), 1);

    meter.mark_n(300);
    assert_eq!(meter.one_minute_rate(), 0.0);

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert!((meter.one_minute_rate() - 60.0).abs() < 1e-9);
    assert!((meter.rate(RateWindow::FifteenMinutes, TimeUnit::Minutes) - 3_600.0).abs() < 1e-6);

    drop(meter);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(ticker.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_registry_metrics_share_one_ticker() {
    let ticker = Arc::new(IntervalTicker::new().unwrap());
    let registry = MetricRegistry::new();

    let chronometer = registry
        .instrument(
            &Metrics::chronometer(TimeUnit::Milliseconds, 1, TimeUnit::Seconds, ticker.clone()),
            MetricKey::simple("db", "query"),
        )
        .unwrap();
    let speedometer = registry
        .instrument(
            &Metrics::speedometer(1, TimeUnit::Seconds, ticker.clone()),
            MetricKey::simple("net", "bytes"),
        )
        .unwrap();
    // Chronometer has one meter, speedometer two.
    assert_eq!(ticker.active(), 3);

    chronometer.update(12).unwrap();
    speedometer.update(100);
    speedometer.update(300);
    tokio::time::sleep(Duration::from_millis(1_050)).await;

    assert!((chronometer.one_minute_rate() - 1.0).abs() < 1e-9);
    assert!((speedometer.one_minute_velocity() - 200.0).abs() < 1e-9);

    registry.stop_all();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(ticker.active(), 0);
    assert!(chronometer.is_stopped());
}

#[test]
fn test_sink_sees_histogram_quantiles() {
    let registry = MetricRegistry::new();
    let histogram = registry
        .instrument(&Metrics::histogram(SampleKind::Uniform), MetricKey::simple("app", "size"))
        .unwrap();
    let sink = Arc::new(CollectingSink::new(
        FactSet::empty().with(MetricFact::Count).with(MetricFact::Median),
    ));
    histogram.set_context_sink(Some(sink.clone()));

    for v in 1..=5 {
        histogram.update(v);
    }

    assert_eq!(sink.records().len(), 5);
    assert_eq!(sink.last(MetricFact::Count), Some(MetricValue::Int(5)));
    assert_eq!(sink.last(MetricFact::Median), Some(MetricValue::Float(3.0)));
    assert_eq!(sink.last(MetricFact::Max), None);
}

#[test]
fn test_chronometer_on_manual_ticker() {
    let ticker = Arc::new(ManualTicker::new());
    let clock = Arc::new(ManualClock::new());
    let chronometer = Metrics::chronometer(TimeUnit::Milliseconds, 5, TimeUnit::Seconds, ticker.clone());
    let registry = MetricRegistry::new();
    let chronometer = registry
        .instrument(&chronometer.clock(clock.clone()), MetricKey::simple("app", "request"))
        .unwrap();

    for _ in 0..10 {
        chronometer.update(20).unwrap();
    }
    assert!(chronometer.update(-1).is_err());
    ticker.tick_all();
    clock.advance(Duration::from_secs(5));

    assert_eq!(chronometer.count(), 10);
    assert_eq!(chronometer.sum(), 200);
    assert!((chronometer.one_minute_rate() - 2.0).abs() < 1e-9);
    assert!((chronometer.average_rate() - 2.0).abs() < 1e-9);
}
