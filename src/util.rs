//! Stage timing.

use std::time::Instant;

/// Run one pipeline stage and log its wall time at INFO level.
///
/// The binary wraps each of its stages (parsing, routing, simulating,
/// writing, plotting) in this so a plain run shows where the time went.
pub fn timed_stage<T>(name: &str, stage: impl FnOnce() -> T) -> T {
    log::debug!("{}...", name);
    let start = Instant::now();
    let out = stage();
    log::info!("{}: {:.3?}", name, start.elapsed());
    out
}
