//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for Admitron.
//!
//! This module provides well-documented constants used throughout the library.
//! All magic numbers are defined here with their purpose and usage context.

/// Default number of buckets per statistic interval.
///
/// Node-level sliding counters split their interval into this many buckets,
/// trading memory for rollover smoothness. Two 500ms buckets per second is
/// the standard configuration for QPS accounting.
pub const DEFAULT_SAMPLE_COUNT: usize = 2;

/// Default statistic interval in milliseconds (1 second).
///
/// The window length node-level counters answer QPS queries over.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Sentinel value marking a bucket cell as mid-reset.
///
/// A writer that claims a stale bucket stores this into the cell's window
/// start, zeroes the counters, then publishes the new start. Readers and
/// competing writers that observe the sentinel must wait or skip the cell.
pub const BUCKET_RESET_IN_PROGRESS: u64 = u64::MAX;

/// Maximum spin-loop iterations before yielding the thread.
///
/// Used by writers waiting on a bucket or parameter window mid-reset.
pub const MAX_SPIN_ITERATIONS: u64 = 1000;

// ============================================================================
// Call Context Constants
// ============================================================================

/// Name of the implicitly created call context.
///
/// A guarded call made on a thread with no bound context gets a context with
/// this name and an empty origin.
pub const DEFAULT_CONTEXT_NAME: &str = "admitron_default_context";

/// Origin value matching every caller.
///
/// A flow rule whose `limit_origin` equals this string consults the
/// aggregate counter rather than any per-origin counter.
pub const RULE_ORIGIN_DEFAULT: &str = "default";

// ============================================================================
// Rule Default Constants
// ============================================================================

/// Default flow-control window length in milliseconds (1 second).
pub const DEFAULT_FLOW_WINDOW_MS: u64 = 1000;

/// Default parameter flow window duration in seconds.
pub const DEFAULT_PARAM_DURATION_SECS: u64 = 1;

/// Default minimum sample size before a circuit breaker may trip.
///
/// Below this many completed calls in the evaluation window, no grade opens
/// the breaker.
pub const DEFAULT_MIN_REQUEST_AMOUNT: u64 = 5;

/// Maximum batch count (tokens) a single entry may request.
///
/// Prevents a single request from consuming an entire window. Must be greater
/// than 0 and less than or equal to 1,000,000.
pub const MAX_BATCH_COUNT: u64 = 1_000_000;

/// Minimum valid batch count for an entry.
///
/// Batch counts must be positive to prevent no-op admissions.
pub const MIN_BATCH_COUNT: u64 = 1;

// ============================================================================
// Parameter Metric Constants
// ============================================================================

/// Capacity of each per-rule parameter value map (4000 distinct values).
///
/// Window-start and token counters for parameter flow control are kept in
/// least-recently-used maps bounded at this many distinct values per rule.
/// Eviction beyond the bound is silent steady-state behavior.
pub const PARAM_METRIC_CAPACITY: usize = 4000;

// ============================================================================
// Time Conversion Constants
// ============================================================================

/// Milliseconds per second.
pub const MS_PER_SECOND: u64 = 1000;

/// Seconds per day.
pub const SECONDS_PER_DAY: u64 = 86400;
