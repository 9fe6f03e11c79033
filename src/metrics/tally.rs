use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::context::{ContextSink, Items, MetricFact, SinkSlot};

/// Up/down counter.
#[derive(Debug, Default)]
pub struct Tally {
    value: AtomicI64,
    sink: SinkSlot,
}

impl Tally {
    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
            sink: SinkSlot::default(),
        }
    }

    pub fn inc(&self) -> i64 {
        self.inc_by(1)
    }

    pub fn inc_by(&self, n: i64) -> i64 {
        let value = self.value.fetch_add(n, Ordering::AcqRel).wrapping_add(n);
        self.report(value);
        value
    }

    pub fn dec(&self) -> i64 {
        self.dec_by(1)
    }

    pub fn dec_by(&self, n: i64) -> i64 {
        let value = self.value.fetch_sub(n, Ordering::AcqRel).wrapping_sub(n);
        self.report(value);
        value
    }

    pub fn count(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Resets to zero, not to the initial value.
    pub fn clear(&self) {
        self.value.store(0, Ordering::Release);
        self.report(0);
    }

    pub fn set_context_sink(&self, sink: Option<Arc<dyn ContextSink>>) {
        self.sink.set(sink);
    }

    fn report(&self, value: i64) {
        if let Some(sink) = self.sink.get() {
            let mut items = Items::new(&*sink);
            items.push(MetricFact::Count, value);
            items.emit();
        }
    }
}
