//! Prometheus metrics for the engine

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
};

lazy_static! {
    /// Simulations accepted after validation
    pub static ref SIMULATIONS_STARTED: IntCounter = IntCounter::new(
        "simulations_started_total",
        "Total simulations started"
    ).expect("metric can be created");

    /// Simulations that returned results
    pub static ref SIMULATIONS_COMPLETED: IntCounter = IntCounter::new(
        "simulations_completed_total",
        "Total simulations completed successfully"
    ).expect("metric can be created");

    /// Simulations that failed, by error kind
    pub static ref SIMULATIONS_FAILED: IntCounterVec = IntCounterVec::new(
        Opts::new("simulations_failed_total", "Total simulations failed"),
        &["reason"]
    ).expect("metric can be created");

    /// Occurrences produced by pattern expansion
    pub static ref OCCURRENCES_EXPANDED: IntCounter = IntCounter::new(
        "occurrences_expanded_total",
        "Total occurrences produced by pattern expansion"
    ).expect("metric can be created");

    /// Run duration distribution
    pub static ref SIMULATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("simulation_duration_seconds", "Simulation run duration in seconds")
            .buckets(vec![0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 5.0])
    ).expect("metric can be created");
}

/// Register all engine metrics on `registry`
pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(SIMULATIONS_STARTED.clone()))?;
    registry.register(Box::new(SIMULATIONS_COMPLETED.clone()))?;
    registry.register(Box::new(SIMULATIONS_FAILED.clone()))?;
    registry.register(Box::new(OCCURRENCES_EXPANDED.clone()))?;
    registry.register(Box::new(SIMULATION_DURATION.clone()))?;
    Ok(())
}
