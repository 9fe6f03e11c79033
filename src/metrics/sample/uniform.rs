use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::RwLock;
use rand::Rng;

use super::{Sample, SampleKind};
use crate::metrics::snapshot::Snapshot;

/// Vitter's Algorithm R: every value seen so far has the same chance of
/// being in the reservoir, independent of stream length.
#[derive(Debug)]
pub struct UniformSample {
    // Held shared by updates, exclusively by clear.
    lock: RwLock<()>,
    values: Box<[AtomicI64]>,
    count: AtomicU64,
}

impl UniformSample {
    pub fn new(reservoir_size: usize) -> Self {
        let values = (0..reservoir_size.max(1)).map(|_| AtomicI64::new(0)).collect();

        Self {
            lock: RwLock::new(()),
            values,
            count: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }
}

impl Sample for UniformSample {
    fn kind(&self) -> SampleKind {
        SampleKind::Uniform
    }

    fn update(&self, value: i64) {
        let _guard = self.lock.read();
        let n = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        let capacity = self.values.len() as u64;

        if n <= capacity {
            self.values[(n - 1) as usize].store(value, Ordering::Release);
        } else {
            let slot = rand::thread_rng().gen_range(0..n);
            if slot < capacity {
                self.values[slot as usize].store(value, Ordering::Release);
            }
        }
    }

    fn clear(&self) {
        let _guard = self.lock.write();
        for slot in self.values.iter() {
            slot.store(0, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Release);
    }

    fn size(&self) -> usize {
        self.count
            .load(Ordering::Acquire)
            .min(self.values.len() as u64) as usize
    }

    fn snapshot(&self) -> Snapshot {
        let _guard = self.lock.read();
        let size = self.size();
        Snapshot::from_longs(self.values[..size].iter().map(|v| v.load(Ordering::Acquire)))
    }
}
