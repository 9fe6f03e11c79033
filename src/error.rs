//! Error types for the instrumentation engine

use thiserror::Error;

use crate::metrics::MetricKind;

pub type Result<T> = std::result::Result<T, InstrumentError>;

/// Boxed error handed back by export collaborators.
pub type ExportError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("Quantile must be within [0, 1], got {0}")]
    InvalidQuantile(f64),

    #[error("Duration must not be negative, got {0}")]
    NegativeDuration(i64),

    #[error("Metric {key} is a {found}, not a {expected}")]
    KindMismatch {
        key: String,
        expected: MetricKind,
        found: MetricKind,
    },

    /// The metric was installed but the export side-channel failed.
    #[error("Metric {key} was installed but could not be exported: {source}")]
    Export {
        key: String,
        #[source]
        source: ExportError,
    },

    #[error("Interval ticker requires a running Tokio runtime")]
    NoRuntime,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl InstrumentError {
    /// Validation failures leave the metric untouched and are the caller's fault.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuantile(_) | Self::NegativeDuration(_) | Self::KindMismatch { .. }
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidQuantile(_) => "INVALID_QUANTILE",
            Self::NegativeDuration(_) => "NEGATIVE_DURATION",
            Self::KindMismatch { .. } => "KIND_MISMATCH",
            Self::Export { .. } => "EXPORT_ERROR",
            Self::NoRuntime => "NO_RUNTIME",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}
