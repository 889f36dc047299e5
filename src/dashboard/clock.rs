//! Process-wide event clock
//!
//! Unix seconds anchored once at first use and advanced by a monotonic
//! `Instant`, so wall-clock adjustments never move timestamps backwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static ANCHOR: OnceLock<(f64, Instant)> = OnceLock::new();
static LAST_MICROS: AtomicU64 = AtomicU64::new(0);

/// Current time in Unix seconds with microsecond precision.
///
/// Successive calls never return a smaller value, across all threads.
pub fn now() -> f64 {
    let (wall, started) = ANCHOR.get_or_init(|| {
        let wall = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        (wall, Instant::now())
    });

    let micros = ((wall + started.elapsed().as_secs_f64()) * 1_000_000.0) as u64;
    let previous = LAST_MICROS.fetch_max(micros, Ordering::SeqCst);
    previous.max(micros) as f64 / 1_000_000.0
}
