//! Monotonic millisecond clock
//!
//! All connection timers are expressed as milliseconds since a fixed,
//! process-wide epoch (the first call to [`now_ms`]). Using a monotonic
//! source keeps timer arithmetic immune to wall-clock jumps.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds elapsed since the process clock epoch.
#[inline]
pub fn now_ms() -> u64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}
