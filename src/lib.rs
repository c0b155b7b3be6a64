//! SeisCorr is a normalized cross-correlation engine for seismic
//! template matching.
//!
//! A long continuous "image" signal is scanned against batches of short
//! "template" signals; every valid lag gets the Pearson correlation
//! coefficient between the template and the image window of equal
//! length. Three entry points are layered leaves-first:
//!
//! - [`ncc_time`] — direct time-domain correlation, the arithmetic
//!   reference and the cheap path for very short templates.
//! - [`ncc_fft`] — batched frequency-domain correlation of one image
//!   against many equal-length templates, with a streaming O(1)-per-lag
//!   normalization.
//! - [`ncc_fft_multi`] — the multi-channel orchestrator: per-channel
//!   [`ncc_fft`] in parallel over per-worker scratch arenas, then
//!   gating, NaN sanitization, clipping, per-row lag padding, and a
//!   deterministic channel stack.
//!
//! Templates for the frequency-domain path must be prepared with
//! [`prepare_templates`]; the time-domain reference only needs
//! [`zero_mean`]. [`fft_len_for`] gives the conventional transform
//! length for a template/image pair.

mod kernel;
mod multi;
mod plan;
pub mod template;
mod trace;
pub mod util;

pub use kernel::fft::ncc_fft;
pub use kernel::time::{ncc_time, ncc_time_batch};
pub use multi::{ncc_fft_multi, ncc_fft_multi_with_opts, MultiOpts, NUM_THREADS_ENV};
pub use template::{prepare_templates, zero_mean, MultiTemplates, TemplateBatch};
pub use util::{fft_len_for, SeisCorrError, SeisCorrResult};
