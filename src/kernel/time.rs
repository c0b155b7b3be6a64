//! Time-domain reference correlator.

use crate::kernel::VAR_EPSILON;
use crate::template::TemplateBatch;
use crate::util::{SeisCorrError, SeisCorrResult};

/// Correlates one template against an image directly in the time domain.
///
/// Writes `image_len - template_len + 1` coefficients into `out`:
/// `out[k] = Σ_p u[p]·(x[p+k] − μ_k) / √(A·B_k)` with `A = Σ u²` and
/// `B_k` the window's squared deviation sum. The image mean slides in
/// O(1) per lag; `B_k` is recomputed from scratch at every lag, which is
/// what makes this the numerically trustworthy reference. Lags whose
/// denominator falls below the variance floor emit 0.
///
/// The output is the Pearson coefficient only for a zero-mean template;
/// centering the template is the caller's job (see
/// [`crate::zero_mean`]). The template's scale cancels.
pub fn ncc_time(template: &[f32], image: &[f32], out: &mut [f32]) -> SeisCorrResult<()> {
    let template_len = template.len();
    if template_len == 0 {
        return Err(SeisCorrError::InvalidDimensions {
            n_templates: 1,
            template_len: 0,
        });
    }
    if image.len() < template_len {
        return Err(SeisCorrError::ImageTooShort {
            image_len: image.len(),
            template_len,
        });
    }
    let steps = image.len() - template_len + 1;
    if out.len() != steps {
        return Err(SeisCorrError::LengthMismatch {
            what: "output",
            expected: steps,
            got: out.len(),
        });
    }

    let mut auto_a = 0.0f64;
    for &u in template {
        auto_a += u as f64 * u as f64;
    }

    let mut sum = 0.0f64;
    for &x in &image[..template_len] {
        sum += x as f64;
    }
    let mut mean = sum / template_len as f64;

    for (k, slot) in out.iter_mut().enumerate() {
        if k > 0 {
            mean += (image[k + template_len - 1] as f64 - image[k - 1] as f64)
                / template_len as f64;
        }
        let mut numerator = 0.0f64;
        let mut auto_b = 0.0f64;
        for (p, &u) in template.iter().enumerate() {
            let dev = image[p + k] as f64 - mean;
            numerator += u as f64 * dev;
            auto_b += dev * dev;
        }
        let denom = (auto_a * auto_b).sqrt();
        *slot = if denom < VAR_EPSILON {
            0.0
        } else {
            (numerator / denom) as f32
        };
    }
    Ok(())
}

/// Applies [`ncc_time`] to every row of a batch.
///
/// Output rows are packed `n_templates × steps`, matching the
/// frequency-domain layout.
pub fn ncc_time_batch(
    batch: &TemplateBatch<'_>,
    image: &[f32],
    out: &mut [f32],
) -> SeisCorrResult<()> {
    let template_len = batch.template_len();
    if image.len() < template_len {
        return Err(SeisCorrError::ImageTooShort {
            image_len: image.len(),
            template_len,
        });
    }
    let steps = image.len() - template_len + 1;
    let expected = batch.n_templates() * steps;
    if out.len() != expected {
        return Err(SeisCorrError::LengthMismatch {
            what: "output",
            expected,
            got: out.len(),
        });
    }
    for (t, row_out) in out.chunks_exact_mut(steps).enumerate() {
        ncc_time(batch.row(t), image, row_out)?;
    }
    Ok(())
}
