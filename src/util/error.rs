//! Error types for seiscorr.

use thiserror::Error;

/// Result alias for seiscorr operations.
pub type SeisCorrResult<T> = std::result::Result<T, SeisCorrError>;

/// Errors that can occur when running seiscorr correlators.
#[derive(Debug, Error)]
pub enum SeisCorrError {
    /// The image is shorter than the template, so no valid lag exists.
    #[error("image too short: image_len {image_len} < template_len {template_len}")]
    ImageTooShort {
        /// Length of the image signal in samples.
        image_len: usize,
        /// Length of the template signal in samples.
        template_len: usize,
    },
    /// The transform length cannot hold the linear correlation.
    #[error("fft length too small: {fft_len} < required {needed}")]
    FftLenTooSmall {
        /// Requested transform length.
        fft_len: usize,
        /// Minimum length for linear (non-circular) correlation.
        needed: usize,
    },
    /// A count or length parameter is zero or overflows.
    #[error("invalid dimensions: {n_templates} templates of length {template_len}")]
    InvalidDimensions {
        /// Number of template rows.
        n_templates: usize,
        /// Template length in samples.
        template_len: usize,
    },
    /// A supplied buffer does not match the expected packed size.
    #[error("{what} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        /// Which buffer failed validation.
        what: &'static str,
        /// Expected element count.
        expected: usize,
        /// Actual element count.
        got: usize,
    },
    /// A template row has no variance and cannot be normalized.
    #[error("degenerate template at row {index}: zero variance")]
    DegenerateTemplate {
        /// Row index within the batch.
        index: usize,
    },
    /// Scratch arena allocation failed.
    #[error("scratch allocation of {bytes} bytes failed")]
    ScratchAlloc {
        /// Size of the failed allocation request.
        bytes: usize,
    },
    /// The worker thread pool could not be constructed.
    #[error("worker pool construction failed: {reason}")]
    WorkerPool {
        /// Backend-reported reason.
        reason: String,
    },
    /// The FFT backend rejected a transform.
    #[error(transparent)]
    Fft(#[from] realfft::FftError),
    /// One or more channel workers failed inside the parallel region.
    #[error("correlation failed on {channels} channel(s)")]
    CorrelationFailed {
        /// Number of channels whose kernel call failed.
        channels: usize,
    },
    /// Samples exceeded the normalization tolerance; output left unstacked.
    #[error("{count} sample(s) exceeded the normalization tolerance; output left unstacked")]
    NormalizationFailures {
        /// Number of out-of-tolerance samples across all channels.
        count: usize,
    },
}
