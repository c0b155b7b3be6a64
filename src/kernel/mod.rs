//! Correlation kernel implementations.
//!
//! `time` is the direct O(template_len · steps) reference; `fft` is the
//! batched frequency-domain path the orchestrator runs per channel. Both
//! accumulate in f64 and emit f32.

pub mod fft;
pub mod time;

/// Variance floor: windows below this are treated as flat and emit 0.
pub(crate) const VAR_EPSILON: f64 = 1e-7;

/// Samples beyond ±1.0 but within this tolerance are clamped; beyond it
/// they count as normalization failures.
pub(crate) const CLIP_TOLERANCE: f32 = 1.01;

/// The streaming variance is recomputed exactly every this many lags to
/// bound floating-point drift.
pub(crate) const VAR_REFRESH_INTERVAL: usize = 10_000;
