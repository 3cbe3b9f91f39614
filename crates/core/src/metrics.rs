//! Prometheus metrics for the conversion manager.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

/// Conversions started total.
pub static CONVERSIONS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("cadence_conversions_started_total", "Total conversions started").unwrap()
});

/// Conversions that reached a terminal status, by status.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cadence_conversions_total",
            "Total conversions by terminal status",
        ),
        &["status"], // "finished", "failed", "canceled"
    )
    .unwrap()
});

/// Wall-clock duration of conversions in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cadence_conversion_duration_seconds",
            "Wall-clock duration of conversions",
        )
        .buckets(vec![
            1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
        ]),
        &["status"],
    )
    .unwrap()
});

/// Conversions currently in progress.
pub static CONVERSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "cadence_conversions_active",
        "Number of conversions currently in progress",
    )
    .unwrap()
});

/// Status lines that failed to parse.
pub static STATUS_LINES_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "cadence_status_lines_dropped_total",
        "Status lines dropped because they could not be parsed",
    )
    .unwrap()
});

/// Get all metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS_STARTED.clone()),
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(CONVERSIONS_ACTIVE.clone()),
        Box::new(STATUS_LINES_DROPPED.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn test_all_metrics_register() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        CONVERSIONS_TOTAL.with_label_values(&["finished"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "cadence_conversions_total"));
    }
}
