//! Prometheus metrics for core components.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

/// Conversions finished, by engine and result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediamill_conversions_total", "Total finished conversions"),
        &["engine", "result"], // engine: "in_process"/"external", result: "success"/"error"
    )
    .unwrap()
});

/// Wall-clock duration of conversions in seconds, by engine.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediamill_conversion_duration_seconds",
            "Duration of a single conversion",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
        &["engine"],
    )
    .unwrap()
});

/// Jobs ever enqueued.
pub static JOBS_ENQUEUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("mediamill_jobs_enqueued_total", "Total jobs enqueued").unwrap()
});

/// Jobs retried by user action.
pub static JOBS_RETRIED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("mediamill_jobs_retried_total", "Total user-initiated retries").unwrap()
});

/// Registers all core metrics into `registry`. Safe to call once per process.
pub fn register_all(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(CONVERSIONS_TOTAL.clone()))?;
    registry.register(Box::new(CONVERSION_DURATION.clone()))?;
    registry.register(Box::new(JOBS_ENQUEUED.clone()))?;
    registry.register(Box::new(JOBS_RETRIED.clone()))?;
    Ok(())
}
