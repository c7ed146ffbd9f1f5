//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Generation call constants
pub mod generation {
    /// Default timeout for a single generation request (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Maximum sections a generated plan may contain
    pub const MAX_PLAN_SECTIONS: usize = 40;
}

/// Retry policy constants for generation calls
pub mod retry {
    /// Default maximum attempts per generation call
    pub const MAX_ATTEMPTS: usize = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;
}

/// Workflow constants
pub mod workflow {
    /// Runs suspended longer than this are surfaced as stale to operators.
    /// Suspension itself has no timeout; this only drives reporting.
    pub const STALE_RUN_THRESHOLD_SECS: i64 = 7 * 24 * 60 * 60;
}

/// Storage constants
pub mod storage {
    /// Default database file name inside the project directory
    pub const DEFAULT_DB_FILE: &str = "fieldscribe.db";
}
