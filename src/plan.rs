//! Shared FFT plans and per-worker scratch arenas.
//!
//! Plans are built once per call, in the calling thread, and shared by
//! every worker: execution against caller-supplied buffers takes `&self`
//! and is safe in parallel. Each worker owns one [`ScratchArena`] holding
//! every buffer its transforms touch, so the parallel region writes no
//! shared state.

use std::mem;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::util::{SeisCorrError, SeisCorrResult};

/// Forward and inverse real-FFT plans for one transform length.
pub(crate) struct CorrelationPlans {
    fft_len: usize,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
}

impl CorrelationPlans {
    /// Plans forward and inverse transforms of length `fft_len`.
    pub fn new(fft_len: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);
        Self {
            fft_len,
            forward,
            inverse,
        }
    }

    /// Returns the transform length.
    pub fn fft_len(&self) -> usize {
        self.fft_len
    }

    /// Returns the number of complex bins per spectrum (`fft_len / 2 + 1`).
    pub fn spectrum_len(&self) -> usize {
        self.fft_len / 2 + 1
    }

    /// Returns the forward (real-to-complex) plan.
    pub fn forward(&self) -> &dyn RealToComplex<f64> {
        self.forward.as_ref()
    }

    /// Returns the inverse (complex-to-real) plan.
    pub fn inverse(&self) -> &dyn ComplexToReal<f64> {
        self.inverse.as_ref()
    }
}

/// Per-worker buffers for one batched correlation.
///
/// Sized for a fixed `(fft_len, n_templates)` pair. [`ScratchArena::reset`]
/// zero-fills the transform inputs and the template sums; the spectra and
/// the inverse output are fully overwritten on every use and are not
/// cleared. Dropping the arena releases everything, on any exit path.
pub(crate) struct ScratchArena {
    /// Zero-padded, time-reversed template rows (`fft_len × n_templates`).
    pub template_ext: Vec<f64>,
    /// Zero-padded image (`fft_len`).
    pub image_ext: Vec<f64>,
    /// Inverse-transform output rows (`fft_len × n_templates`).
    pub ccc: Vec<f64>,
    /// Template spectra (`spectrum_len × n_templates`).
    pub spec_t: Vec<Complex<f64>>,
    /// Image spectrum (`spectrum_len`).
    pub spec_i: Vec<Complex<f64>>,
    /// Spectral products (`spectrum_len × n_templates`).
    pub prod: Vec<Complex<f64>>,
    /// Per-row template sums for the mean correction (`n_templates`).
    pub norm_sums: Vec<f64>,
    /// Backend scratch, sized for the larger of the two plans.
    pub fft_scratch: Vec<Complex<f64>>,
}

impl ScratchArena {
    /// Allocates all buffers for `n_templates` rows under `plans`.
    ///
    /// Allocation is fallible: a failed reservation surfaces as
    /// [`SeisCorrError::ScratchAlloc`] and whatever was already acquired
    /// is released when the partially built arena drops.
    pub fn try_new(plans: &CorrelationPlans, n_templates: usize) -> SeisCorrResult<Self> {
        let fft_len = plans.fft_len();
        let spectrum_len = plans.spectrum_len();
        let scratch_len = plans
            .forward()
            .get_scratch_len()
            .max(plans.inverse().get_scratch_len());
        Ok(Self {
            template_ext: try_zeroed(fft_len * n_templates)?,
            image_ext: try_zeroed(fft_len)?,
            ccc: try_zeroed(fft_len * n_templates)?,
            spec_t: try_zeroed(spectrum_len * n_templates)?,
            spec_i: try_zeroed(spectrum_len)?,
            prod: try_zeroed(spectrum_len * n_templates)?,
            norm_sums: try_zeroed(n_templates)?,
            fft_scratch: try_zeroed(scratch_len)?,
        })
    }

    /// Zero-fills the transform inputs ahead of a channel's work.
    ///
    /// The arena carries no state between channels; only the zero padding
    /// of `template_ext` and `image_ext` (and the cleared `norm_sums`)
    /// must survive into the next use.
    pub fn reset(&mut self) {
        self.template_ext.fill(0.0);
        self.image_ext.fill(0.0);
        self.norm_sums.fill(0.0);
    }
}

fn try_zeroed<T: Copy + Default>(len: usize) -> SeisCorrResult<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| SeisCorrError::ScratchAlloc {
            bytes: len * mem::size_of::<T>(),
        })?;
    buf.resize(len, T::default());
    Ok(buf)
}
