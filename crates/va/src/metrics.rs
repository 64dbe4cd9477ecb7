//! Prometheus metrics for the VA

use prometheus::{HistogramOpts, HistogramVec, Registry};
use std::fmt;
use std::time::Duration;

/// Metrics emitted by the validation pipeline.
#[derive(Clone)]
pub struct VaMetrics {
    validation_duration: HistogramVec,
}

impl fmt::Debug for VaMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaMetrics").finish_non_exhaustive()
    }
}

impl VaMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let validation_duration = HistogramVec::new(
            HistogramOpts::new(
                "va_validation_duration_seconds",
                "Wall-clock duration of validation attempts",
            ),
            &["challenge", "status"],
        )?;
        Ok(Self {
            validation_duration,
        })
    }

    /// Expose the VA's collectors on a registry.
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.validation_duration.clone()))
    }

    /// Record one completed validation, keyed by challenge type and the
    /// resulting status.
    pub fn observe_validation(&self, challenge: &str, status: &str, elapsed: Duration) {
        self.validation_duration
            .with_label_values(&[challenge, status])
            .observe(elapsed.as_secs_f64());
    }
}
