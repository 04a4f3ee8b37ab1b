// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

// Macros for metrics when observability is disabled
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

// Macros for describe_* functions when observability is disabled
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

// Re-export macros for use in this module when observability is disabled
#[cfg(not(feature = "observability"))]
use crate::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    // Pricing boundary
    describe_histogram!(
        "sim_calc_amount_out_us",
        "CalcAmountOut latency in microseconds, labeled by pool_type and outcome."
    );
    describe_counter!(
        "sim_calc_amount_out_total",
        Unit::Count,
        "Total CalcAmountOut calls, labeled by pool_type and outcome (ok or error class)."
    );
    describe_counter!(
        "sim_calc_amount_out_panic_total",
        Unit::Count,
        "Total panics contained at the CalcAmountOut boundary, labeled by pool_type."
    );

    // Inventory
    describe_counter!(
        "sim_inventory_rejections_total",
        Unit::Count,
        "Total UpdateLimit calls rejected because the counterparty balance was too small."
    );

    // Simulator cache
    describe_gauge!("sim_cache_size", "Number of simulators held in the cache.");
    describe_counter!("sim_cache_hit_total", Unit::Count, "Simulator cache hits.");
    describe_counter!("sim_cache_miss_total", Unit::Count, "Simulator cache misses.");
    describe_histogram!(
        "sim_best_quote_ms",
        "Parallel best-quote fan-out latency in milliseconds."
    );

    // Tracker
    describe_counter!(
        "sim_tracker_refresh_total",
        Unit::Count,
        "Pool state refreshes, labeled by pool_type and result."
    );
}

pub fn record_calc_amount_out(pool_type: &str, outcome: &'static str, duration: std::time::Duration) {
    histogram!("sim_calc_amount_out_us", duration.as_micros() as f64, "pool_type" => pool_type.to_string(), "outcome" => outcome);
    counter!("sim_calc_amount_out_total", 1, "pool_type" => pool_type.to_string(), "outcome" => outcome);
}

/// Track panics converted into CalcAmountOutPanic
pub fn increment_calc_amount_out_panic(pool_type: &str) {
    counter!("sim_calc_amount_out_panic_total", 1, "pool_type" => pool_type.to_string());
}

pub fn increment_inventory_rejection() {
    increment_counter!("sim_inventory_rejections_total");
}

pub fn set_cache_size(size: f64) {
    gauge!("sim_cache_size", size);
}

pub fn increment_cache_hit() {
    increment_counter!("sim_cache_hit_total");
}

pub fn increment_cache_miss() {
    increment_counter!("sim_cache_miss_total");
}

pub fn record_best_quote(duration: std::time::Duration, pools: usize) {
    histogram!("sim_best_quote_ms", duration.as_millis() as f64, "pools" => pools.to_string());
}

pub fn increment_tracker_refresh(pool_type: &str, result: &'static str) {
    counter!("sim_tracker_refresh_total", 1, "pool_type" => pool_type.to_string(), "result" => result);
}
