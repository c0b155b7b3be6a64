//! Batched frequency-domain correlator.
//!
//! One image is correlated against every row of a template batch through
//! a single transform length: the rows are time-reversed and zero-padded,
//! transformed, multiplied bin-wise with the image spectrum, inverse
//! transformed, and normalized by a streaming mean/variance sweep over
//! the image windows. Reversing the rows before the forward transform
//! makes the spectral product the correlation rather than the
//! convolution, so no conjugation pass is needed.

use crate::kernel::{VAR_EPSILON, VAR_REFRESH_INTERVAL};
use crate::plan::{CorrelationPlans, ScratchArena};
use crate::template::TemplateBatch;
use crate::util::math::WindowStats;
use crate::util::{SeisCorrError, SeisCorrResult};

/// Validates one channel's geometry; returns the valid-lag count.
pub(crate) fn validate_args(
    template_len: usize,
    image_len: usize,
    fft_len: usize,
) -> SeisCorrResult<usize> {
    if image_len < template_len {
        return Err(SeisCorrError::ImageTooShort {
            image_len,
            template_len,
        });
    }
    let needed = template_len + image_len - 1;
    if fft_len < needed {
        return Err(SeisCorrError::FftLenTooSmall { fft_len, needed });
    }
    Ok(image_len - template_len + 1)
}

/// Correlates a template batch against one image in the frequency domain.
///
/// Writes `n_templates × steps` coefficients into `out`, packed row-major
/// with `steps = image_len - template_len + 1`.
///
/// # Template contract
///
/// The denominator applied here is the image-window deviation only. The
/// output is the Pearson coefficient **only if every template row has
/// been pre-scaled so its deviation norm is `1/sqrt(template_len)`** —
/// the exact form [`crate::prepare_templates`] produces. Rows in any
/// other scale yield proportionally scaled output, which the
/// multi-channel orchestrator will flag as normalization failures.
///
/// Lags where the image window's variance falls below the variance floor
/// emit 0 for every template. `fft_len` must be at least
/// `template_len + image_len - 1` to keep the correlation linear; see
/// [`crate::fft_len_for`] for the conventional choice.
pub fn ncc_fft(
    batch: &TemplateBatch<'_>,
    image: &[f32],
    fft_len: usize,
    out: &mut [f32],
) -> SeisCorrResult<()> {
    let steps = validate_args(batch.template_len(), image.len(), fft_len)?;
    let expected = batch.n_templates() * steps;
    if out.len() != expected {
        return Err(SeisCorrError::LengthMismatch {
            what: "output",
            expected,
            got: out.len(),
        });
    }
    let plans = CorrelationPlans::new(fft_len);
    let mut scratch = ScratchArena::try_new(&plans, batch.n_templates())?;
    ncc_fft_with(batch, image, &plans, &mut scratch, out)
}

/// [`ncc_fft`] against caller-owned plans and scratch.
///
/// This is the per-channel worker body: the orchestrator builds plans
/// once, hands every worker its own arena, and calls this in parallel.
/// Arguments are assumed validated (see [`validate_args`]); the arena
/// must be sized for the same `(fft_len, n_templates)` pair as `plans`.
pub(crate) fn ncc_fft_with(
    batch: &TemplateBatch<'_>,
    image: &[f32],
    plans: &CorrelationPlans,
    scratch: &mut ScratchArena,
    out: &mut [f32],
) -> SeisCorrResult<()> {
    let template_len = batch.template_len();
    let n_templates = batch.n_templates();
    let fft_len = plans.fft_len();
    let spectrum_len = plans.spectrum_len();
    let steps = image.len() - template_len + 1;
    debug_assert_eq!(scratch.template_ext.len(), fft_len * n_templates);
    debug_assert_eq!(out.len(), n_templates * steps);

    scratch.reset();

    // Reversed rows, zero padding beyond template_len; row sums feed the
    // mean correction in the normalization pass.
    for (t, ext_row) in scratch
        .template_ext
        .chunks_exact_mut(fft_len)
        .enumerate()
    {
        let row = batch.row(t);
        let mut sum = 0.0f64;
        for (i, &value) in row.iter().enumerate() {
            ext_row[template_len - 1 - i] = value as f64;
            sum += value as f64;
        }
        scratch.norm_sums[t] = sum;
    }
    for (ext, &value) in scratch.image_ext.iter_mut().zip(image) {
        *ext = value as f64;
    }

    // One shared plan serves every row; only the buffers vary.
    for (ext_row, spec_row) in scratch
        .template_ext
        .chunks_exact_mut(fft_len)
        .zip(scratch.spec_t.chunks_exact_mut(spectrum_len))
    {
        plans
            .forward()
            .process_with_scratch(ext_row, spec_row, &mut scratch.fft_scratch)?;
    }
    plans.forward().process_with_scratch(
        &mut scratch.image_ext,
        &mut scratch.spec_i,
        &mut scratch.fft_scratch,
    )?;

    for (prod_row, spec_row) in scratch
        .prod
        .chunks_exact_mut(spectrum_len)
        .zip(scratch.spec_t.chunks_exact(spectrum_len))
    {
        for ((p, &a), &b) in prod_row.iter_mut().zip(spec_row).zip(&scratch.spec_i) {
            *p = a * b;
        }
        // The DC and Nyquist bins of a real signal's spectrum carry no
        // imaginary part; pin them so the inverse transform accepts the
        // product even when the image held non-finite samples.
        prod_row[0].im = 0.0;
        if fft_len % 2 == 0 {
            prod_row[spectrum_len - 1].im = 0.0;
        }
    }

    for (prod_row, ccc_row) in scratch
        .prod
        .chunks_exact_mut(spectrum_len)
        .zip(scratch.ccc.chunks_exact_mut(fft_len))
    {
        plans
            .inverse()
            .process_with_scratch(prod_row, ccc_row, &mut scratch.fft_scratch)?;
    }

    // Valid lags start at template_len - 1 of each inverse row. The
    // round trip is unnormalized by fft_len.
    let startind = template_len - 1;
    let scale = 1.0 / fft_len as f64;
    let mut stats = WindowStats::from_window(&image[..template_len]);
    for k in 0..steps {
        if k > 0 {
            if k % VAR_REFRESH_INTERVAL == 0 {
                stats.recompute(&image[k..k + template_len]);
            } else {
                stats.slide(image[k - 1] as f64, image[k + template_len - 1] as f64);
            }
        }
        if stats.var < VAR_EPSILON {
            for t in 0..n_templates {
                out[t * steps + k] = 0.0;
            }
            continue;
        }
        let mean = stats.mean;
        let stdev = stats.stdev();
        for t in 0..n_templates {
            let raw = scratch.ccc[t * fft_len + startind + k] * scale;
            out[t * steps + k] = ((raw - scratch.norm_sums[t] * mean) / stdev) as f32;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ncc_fft, validate_args};
    use crate::template::{prepare_templates, TemplateBatch};
    use crate::util::math::fft_len_for;
    use crate::util::SeisCorrError;

    #[test]
    fn validate_rejects_bad_geometry() {
        assert!(matches!(
            validate_args(8, 4, 16),
            Err(SeisCorrError::ImageTooShort { .. })
        ));
        assert!(matches!(
            validate_args(4, 9, 8),
            Err(SeisCorrError::FftLenTooSmall { needed: 12, .. })
        ));
        assert_eq!(validate_args(4, 9, 16).unwrap(), 6);
    }

    #[test]
    fn output_length_is_checked() {
        let templates = vec![0.5f32, -0.5, 0.5, -0.5];
        let batch = TemplateBatch::new(&templates, 1, 4).unwrap();
        let image = vec![0.0f32; 9];
        let mut out = vec![0.0f32; 5];
        assert!(matches!(
            ncc_fft(&batch, &image, 16, &mut out),
            Err(SeisCorrError::LengthMismatch { expected: 6, .. })
        ));
    }

    #[test]
    fn embedded_template_peaks_at_alignment() {
        let mut templates = vec![1.0f32, 2.0, 3.0, 4.0];
        prepare_templates(&mut templates, 4).unwrap();
        let image = [0.0f32, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 0.0, 0.0];
        let batch = TemplateBatch::new(&templates, 1, 4).unwrap();
        let mut out = vec![0.0f32; 6];
        ncc_fft(&batch, &image, fft_len_for(4, image.len()), &mut out).unwrap();
        assert!((out[3] - 1.0).abs() < 1e-4, "peak = {}", out[3]);
        for &v in &out {
            assert!(v.abs() <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn constant_image_emits_zeros() {
        let mut templates = vec![1.0f32, 2.0, 3.0, 4.0];
        prepare_templates(&mut templates, 4).unwrap();
        let image = [5.0f32; 10];
        let batch = TemplateBatch::new(&templates, 1, 4).unwrap();
        let mut out = vec![9.9f32; 7];
        ncc_fft(&batch, &image, fft_len_for(4, 10), &mut out).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn batch_rows_are_independent() {
        let mut templates = vec![
            1.0f32, 2.0, 3.0, 4.0, //
            4.0, 3.0, 2.0, 1.0, //
        ];
        prepare_templates(&mut templates, 4).unwrap();
        let image: Vec<f32> = (0..24).map(|i| ((i * 5) % 7) as f32 - 3.0).collect();
        let fft_len = fft_len_for(4, image.len());
        let batch = TemplateBatch::new(&templates, 2, 4).unwrap();
        let steps = image.len() - 4 + 1;
        let mut packed = vec![0.0f32; 2 * steps];
        ncc_fft(&batch, &image, fft_len, &mut packed).unwrap();
        for t in 0..2 {
            let single = TemplateBatch::new(batch.row(t), 1, 4).unwrap();
            let mut row_out = vec![0.0f32; steps];
            ncc_fft(&single, &image, fft_len, &mut row_out).unwrap();
            for (a, b) in packed[t * steps..(t + 1) * steps].iter().zip(&row_out) {
                assert!((a - b).abs() < 1e-5);
            }
        }
    }
}
