//! Epoch clock and delay helpers.
//!
//! The baseline is captured once per process by [`capture`] (called from
//! `Hal::setup`). It is a monotonic instant, so [`millis`] and [`micros`]
//! never go backwards even if the wall clock is stepped.

use sbc_common::consts::BUSY_WAIT_THRESHOLD_US;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Capture the process baseline. Returns `false` if it was already captured.
pub fn capture() -> bool {
    let mut captured = false;
    EPOCH.get_or_init(|| {
        captured = true;
        Instant::now()
    });
    captured
}

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Milliseconds since the baseline.
pub fn millis() -> u64 {
    epoch().elapsed().as_millis() as u64
}

/// Microseconds since the baseline.
pub fn micros() -> u64 {
    epoch().elapsed().as_micros() as u64
}

/// Block the calling thread for `ms` milliseconds.
pub fn delay(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

/// Block the calling thread for `us` microseconds.
///
/// Short delays busy-poll: the scheduler's sleep granularity is coarser
/// than the delay itself.
pub fn delay_us(us: u64) {
    if us == 0 {
        return;
    }
    if us < BUSY_WAIT_THRESHOLD_US {
        let deadline = Instant::now() + Duration::from_micros(us);
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    } else {
        thread::sleep(Duration::from_micros(us));
    }
}
