//! Monotonic seconds shared by every worker, anchored at process start so
//! timestamps are comparable across disks.

use std::sync::OnceLock;
use std::time::Instant;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

fn origin() -> Instant {
    *ORIGIN.get_or_init(Instant::now)
}

/// Pin the origin; called once when the manager starts.
pub(crate) fn init() {
    let _ = origin();
}

pub(crate) fn seconds() -> u64 {
    origin().elapsed().as_secs()
}

pub(crate) fn seconds_at(t: Instant) -> u64 {
    t.saturating_duration_since(origin()).as_secs()
}
