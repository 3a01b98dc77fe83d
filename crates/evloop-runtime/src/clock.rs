//! Monotonic clock used to stamp frame updates

use evloop_core::constants::NSEC_PER_SEC;
use nix::time::{clock_gettime, ClockId};

/// Current `CLOCK_MONOTONIC` time in nanoseconds
#[inline]
pub fn now_ns() -> u64 {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() as u64 * NSEC_PER_SEC + ts.tv_nsec() as u64,
        // CLOCK_MONOTONIC cannot fail on supported systems
        Err(_) => 0,
    }
}
