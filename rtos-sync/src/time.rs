//! Time structures.
//!
//! Timed operations take a [`Timeout`], a relative duration with microsecond
//! resolution. Durations are built with the extension traits re-exported
//! from [`export`], e.g. `500.millis()` or `Timeout::micros(1000)`.

pub mod export {
    pub use fugit::{Duration, ExtU64};
}

/// Relative timeout for timed waits.
pub type Timeout = fugit::MicrosDurationU64;

/// Converts a [`Timeout`] into a std duration.
#[cfg(feature = "std")]
pub(crate) fn to_std(timeout: Timeout) -> std::time::Duration {
    std::time::Duration::from_micros(timeout.to_micros())
}
