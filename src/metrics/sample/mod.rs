//! Bounded reservoirs over an unbounded stream of values.

mod decaying;
mod uniform;

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

use super::snapshot::Snapshot;

pub use decaying::ExponentiallyDecayingSample;
pub use uniform::UniformSample;

/// A fixed-capacity sample. `size()` never exceeds the capacity.
pub trait Sample: Send + Sync + fmt::Debug {
    fn kind(&self) -> SampleKind;

    fn update(&self, value: i64);

    fn clear(&self);

    fn size(&self) -> usize;

    fn snapshot(&self) -> Snapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    /// Vitter's Algorithm R over the whole stream.
    Uniform,
    /// Forward-decaying priority reservoir, biased toward recent values.
    Biased,
}

impl SampleKind {
    /// Roughly 99.9% confidence with a 5% margin of error on a normal distribution.
    pub const DEFAULT_SIZE: usize = 1028;
    /// Heavily biases toward the last five minutes of values.
    pub const DEFAULT_ALPHA: f64 = 0.015;

    pub fn create(self, clock: Arc<dyn Clock>) -> Box<dyn Sample> {
        self.create_with(Self::DEFAULT_SIZE, Self::DEFAULT_ALPHA, clock)
    }

    /// `alpha` only applies to biased samples.
    pub fn create_with(self, size: usize, alpha: f64, clock: Arc<dyn Clock>) -> Box<dyn Sample> {
        match self {
            Self::Uniform => Box::new(UniformSample::new(size)),
            Self::Biased => Box::new(ExponentiallyDecayingSample::new(size, alpha, clock)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Biased => "biased",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SampleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "biased" | "exponential" => Ok(Self::Biased),
            other => Err(format!("unknown sample kind \"{other}\"")),
        }
    }
}

/// Uniform draw in (0, 1] from the calling thread's generator.
pub(crate) fn unit_random() -> f64 {
    1.0 - rand::thread_rng().gen::<f64>()
}
