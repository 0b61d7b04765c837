// SPDX-License-Identifier: MPL-2.0
//! Centralized default values for all configuration constants.
//!
//! This module serves as the single source of truth for default values
//! used across the crate. Constants are organized by category.
//!
//! # Categories
//!
//! - **Buffers**: Ring buffer capacities per signal type
//! - **Issues**: Thresholds for the common-issue rule set
//! - **Recovery**: Buffer sizes that trigger automatic clearing

// ==========================================================================
// Buffer Defaults
// ==========================================================================

/// Default number of log entries retained.
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Default number of error reports retained.
pub const DEFAULT_ERROR_CAPACITY: usize = 50;

/// Default number of performance metrics retained.
pub const DEFAULT_METRIC_CAPACITY: usize = 100;

// ==========================================================================
// Issue Detection Defaults
// ==========================================================================

/// Window (in seconds) in which error reports count as "recent".
pub const DEFAULT_RECENT_ERROR_WINDOW_SECS: u64 = 5 * 60;

/// More recent error reports than this raise a high-severity issue.
pub const DEFAULT_RECENT_ERROR_THRESHOLD: usize = 5;

/// Memory usage percentage above which an issue is raised.
pub const DEFAULT_MEMORY_USAGE_THRESHOLD_PERCENT: f32 = 80.0;

// ==========================================================================
// Recovery Defaults
// ==========================================================================

/// Log buffers longer than this are cleared by recovery.
pub const DEFAULT_RECOVERY_LOG_THRESHOLD: usize = 100;

/// Error-report buffers longer than this are cleared by recovery.
pub const DEFAULT_RECOVERY_ERROR_THRESHOLD: usize = 20;

// ==========================================================================
// Compile-time Validation
// ==========================================================================

const _: () = {
    assert!(DEFAULT_LOG_CAPACITY > 0);
    assert!(DEFAULT_ERROR_CAPACITY > 0);
    assert!(DEFAULT_METRIC_CAPACITY > 0);

    assert!(DEFAULT_RECENT_ERROR_WINDOW_SECS > 0);
    assert!(DEFAULT_MEMORY_USAGE_THRESHOLD_PERCENT > 0.0);
    assert!(DEFAULT_MEMORY_USAGE_THRESHOLD_PERCENT <= 100.0);

    // Recovery thresholds must be reachable within the buffer capacity
    assert!(DEFAULT_RECOVERY_LOG_THRESHOLD < DEFAULT_LOG_CAPACITY);
    assert!(DEFAULT_RECOVERY_ERROR_THRESHOLD < DEFAULT_ERROR_CAPACITY);
};
