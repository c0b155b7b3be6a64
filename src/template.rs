//! Borrowed views over packed template batches, and template preparation.
//!
//! Templates are packed row-major: a batch holds `n_templates` rows of
//! `template_len` f32 samples each. Multi-channel sets prepend a channel
//! axis. Views validate the packing at construction so the kernels can
//! index without rechecking.

use crate::util::{SeisCorrError, SeisCorrResult};

/// Borrowed batch of equal-length template rows.
#[derive(Copy, Clone, Debug)]
pub struct TemplateBatch<'a> {
    data: &'a [f32],
    n_templates: usize,
    template_len: usize,
}

impl<'a> TemplateBatch<'a> {
    /// Creates a batch view over `n_templates × template_len` packed samples.
    pub fn new(data: &'a [f32], n_templates: usize, template_len: usize) -> SeisCorrResult<Self> {
        let needed = checked_size(n_templates, template_len)?;
        if data.len() != needed {
            return Err(SeisCorrError::LengthMismatch {
                what: "templates",
                expected: needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            n_templates,
            template_len,
        })
    }

    /// Returns the number of template rows.
    pub fn n_templates(&self) -> usize {
        self.n_templates
    }

    /// Returns the length of each template row in samples.
    pub fn template_len(&self) -> usize {
        self.template_len
    }

    /// Returns the packed backing slice.
    pub fn data(&self) -> &'a [f32] {
        self.data
    }

    /// Returns template row `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t >= n_templates`; kernels only iterate valid rows.
    pub fn row(&self, t: usize) -> &'a [f32] {
        &self.data[t * self.template_len..(t + 1) * self.template_len]
    }
}

/// Borrowed multi-channel template set: `n_channels` stacked batches.
#[derive(Copy, Clone)]
pub struct MultiTemplates<'a> {
    data: &'a [f32],
    n_channels: usize,
    n_templates: usize,
    template_len: usize,
}

impl<'a> MultiTemplates<'a> {
    /// Creates a view over `n_channels × n_templates × template_len` samples.
    pub fn new(
        data: &'a [f32],
        n_channels: usize,
        n_templates: usize,
        template_len: usize,
    ) -> SeisCorrResult<Self> {
        if n_channels == 0 {
            return Err(SeisCorrError::InvalidDimensions {
                n_templates,
                template_len,
            });
        }
        let per_channel = checked_size(n_templates, template_len)?;
        let needed = per_channel
            .checked_mul(n_channels)
            .ok_or(SeisCorrError::InvalidDimensions {
                n_templates,
                template_len,
            })?;
        if data.len() != needed {
            return Err(SeisCorrError::LengthMismatch {
                what: "templates",
                expected: needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            n_channels,
            n_templates,
            template_len,
        })
    }

    /// Returns the number of channels.
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Returns the number of template rows per channel.
    pub fn n_templates(&self) -> usize {
        self.n_templates
    }

    /// Returns the length of each template row in samples.
    pub fn template_len(&self) -> usize {
        self.template_len
    }

    /// Returns the batch belonging to channel `c`.
    ///
    /// # Panics
    ///
    /// Panics if `c >= n_channels`.
    pub fn channel(&self, c: usize) -> TemplateBatch<'a> {
        let per_channel = self.n_templates * self.template_len;
        TemplateBatch {
            data: &self.data[c * per_channel..(c + 1) * per_channel],
            n_templates: self.n_templates,
            template_len: self.template_len,
        }
    }
}

fn checked_size(n_templates: usize, template_len: usize) -> SeisCorrResult<usize> {
    if n_templates == 0 || template_len == 0 {
        return Err(SeisCorrError::InvalidDimensions {
            n_templates,
            template_len,
        });
    }
    n_templates
        .checked_mul(template_len)
        .ok_or(SeisCorrError::InvalidDimensions {
            n_templates,
            template_len,
        })
}

/// Prepares packed template rows for the frequency-domain correlator.
///
/// Each row is centered and scaled in place to `(u - mean) / (std * len)`,
/// which leaves the row's deviation norm at `1/sqrt(len)`. With rows in
/// this form, [`crate::ncc_fft`] divides only by the image-window
/// deviation and its output is the Pearson coefficient.
///
/// A row with (near) zero variance cannot be scaled and yields
/// [`SeisCorrError::DegenerateTemplate`]; rows before it are already
/// rewritten when that happens.
pub fn prepare_templates(templates: &mut [f32], template_len: usize) -> SeisCorrResult<()> {
    if template_len == 0 || templates.is_empty() || templates.len() % template_len != 0 {
        return Err(SeisCorrError::InvalidDimensions {
            n_templates: templates.len() / template_len.max(1),
            template_len,
        });
    }
    for (index, row) in templates.chunks_exact_mut(template_len).enumerate() {
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for &value in row.iter() {
            let v = value as f64;
            sum += v;
            sum_sq += v * v;
        }
        let len = template_len as f64;
        let mean = sum / len;
        let variance = sum_sq / len - mean * mean;
        if variance <= 1e-8 {
            return Err(SeisCorrError::DegenerateTemplate { index });
        }
        let scale = 1.0 / (variance.sqrt() * len);
        for value in row.iter_mut() {
            *value = ((*value as f64 - mean) * scale) as f32;
        }
    }
    Ok(())
}

/// Removes the mean from a signal in place.
///
/// [`crate::ncc_time`] requires a zero-mean template; its output is
/// invariant to the template's scale, so centering is the only
/// preparation the time-domain path needs.
pub fn zero_mean(signal: &mut [f32]) {
    if signal.is_empty() {
        return;
    }
    let mut sum = 0.0f64;
    for &value in signal.iter() {
        sum += value as f64;
    }
    let mean = sum / signal.len() as f64;
    for value in signal.iter_mut() {
        *value = (*value as f64 - mean) as f32;
    }
}
