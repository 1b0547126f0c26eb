//! Data model of the disk survey: disk identity/classification and the
//! per-disk rolling latency window. Pure state and arithmetic; the engine
//! that feeds it lives in `disksurvey-monitor`.

mod disk;
mod latency;

pub use disk::{AtaHealth, DiskClass, DiskInfo, SasHealth};
pub use latency::{Latency, LatencySummary};

/// Bounds on the recorded identity strings, after ATA swab normalization.
pub mod limits {
    pub const MAX_VENDOR_LEN: usize = 24;
    pub const MAX_MODEL_LEN: usize = 40;
    pub const MAX_SERIAL_LEN: usize = 40;
    pub const MAX_FW_REV_LEN: usize = 8;
    pub const MAX_SG_PATH_LEN: usize = 31;
}

/// Top-K maxima kept per latency bucket.
pub const NUM_TOP_LATENCIES: usize = 5;

/// Histogram buckets per latency bucket; the last one is the overflow.
pub const HIST_BUCKETS: usize = 7;

/// Finite histogram boundaries in milliseconds; samples above the last one
/// land in the overflow bucket.
pub const LATENCY_BOUNDARIES_MS: [f64; HIST_BUCKETS - 1] = [0.5, 1.0, 3.0, 7.0, 10.0, 15.0];

/// Rolling-window length: one bucket per five-minute tick, thirty days.
pub const LATENCY_ENTRIES: usize = 12 * 24 * 30;
