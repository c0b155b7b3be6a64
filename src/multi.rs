//! Multi-channel orchestrator.
//!
//! Runs the frequency-domain correlator over every channel of a
//! multi-channel template set, then reduces the per-channel correlograms
//! into one stacked correlogram. Channels are independent: each worker
//! gets the channel's template batch, its image slice, its output slice,
//! and a private scratch arena. The FFT plans are built once in the
//! calling thread and shared; executing them against per-worker buffers
//! is thread-safe.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::kernel::fft::{ncc_fft_with, validate_args};
use crate::kernel::CLIP_TOLERANCE;
use crate::plan::{CorrelationPlans, ScratchArena};
use crate::template::{MultiTemplates, TemplateBatch};
use crate::trace::{trace_event, trace_span};
use crate::util::{SeisCorrError, SeisCorrResult};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Worker-count override for [`ncc_fft_multi`].
pub const NUM_THREADS_ENV: &str = "SEISCORR_NUM_THREADS";

/// Options for the multi-channel orchestrator.
#[derive(Clone, Copy, Debug, Default)]
pub struct MultiOpts {
    /// Worker-count override. `None` falls back to the
    /// [`NUM_THREADS_ENV`] environment variable, then to the hardware
    /// parallelism. The pool never exceeds the channel count.
    pub num_threads: Option<usize>,
}

/// Correlates every channel of a template set and stacks the results.
///
/// `images` holds `n_channels` signals of `image_len` samples packed
/// back to back; `out` must hold `n_channels × n_templates × steps`
/// values. Per channel, each template row is gated (`used_chans` entry
/// false → row forced to zero), sanitized (NaN → 0, values in
/// `(1.0, 1.01]` / `[-1.01, -1.0)` clamped to ±1, anything larger
/// counted as a normalization failure), and rotated left by its
/// `pad_array` entry with a zero-filled tail — rotation is skipped once
/// any normalization failure has been flagged, leaving rows inspectable.
///
/// On success the channels are summed, in ascending channel order, into
/// the first channel's slot: **only the first `n_templates × steps`
/// entries of `out` are meaningful**. The remaining slots keep their
/// sanitized per-channel rows and callers must not interpret them.
///
/// On [`SeisCorrError::NormalizationFailures`] the stack is suppressed
/// and `out` holds the sanitized, unstacked per-channel rows for
/// inspection. Any other error leaves `out` unspecified.
///
/// Template rows must be prepared as for [`crate::ncc_fft`]; see
/// [`crate::prepare_templates`].
pub fn ncc_fft_multi(
    templates: &MultiTemplates<'_>,
    images: &[f32],
    image_len: usize,
    fft_len: usize,
    used_chans: &[bool],
    pad_array: &[usize],
    out: &mut [f32],
) -> SeisCorrResult<()> {
    ncc_fft_multi_with_opts(
        templates,
        images,
        image_len,
        fft_len,
        used_chans,
        pad_array,
        out,
        MultiOpts::default(),
    )
}

/// [`ncc_fft_multi`] with explicit orchestrator options.
#[allow(clippy::too_many_arguments)]
pub fn ncc_fft_multi_with_opts(
    templates: &MultiTemplates<'_>,
    images: &[f32],
    image_len: usize,
    fft_len: usize,
    used_chans: &[bool],
    pad_array: &[usize],
    out: &mut [f32],
    opts: MultiOpts,
) -> SeisCorrResult<()> {
    let n_channels = templates.n_channels();
    let n_templates = templates.n_templates();
    let template_len = templates.template_len();

    let steps = validate_args(template_len, image_len, fft_len)?;
    let chan_len = n_templates * steps;
    check_len("images", n_channels * image_len, images.len())?;
    check_len("used_chans", n_channels * n_templates, used_chans.len())?;
    check_len("pad_array", n_channels * n_templates, pad_array.len())?;
    check_len("output", n_channels * chan_len, out.len())?;

    let workers = if cfg!(feature = "rayon") {
        worker_count(n_channels, opts.num_threads)
    } else {
        1
    };
    let _span = trace_span!(
        "ncc_fft_multi",
        channels = n_channels,
        templates = n_templates,
        workers = workers
    )
    .entered();

    let plans = CorrelationPlans::new(fft_len);
    let mut arenas = Vec::with_capacity(workers);
    for _ in 0..workers {
        arenas.push(Mutex::new(ScratchArena::try_new(&plans, n_templates)?));
    }

    let kernel_failures = AtomicUsize::new(0);
    let norm_failures = AtomicUsize::new(0);

    let run_channel = |chan: usize, out_chan: &mut [f32], scratch: &mut ScratchArena| {
        let image = &images[chan * image_len..][..image_len];
        let used = &used_chans[chan * n_templates..][..n_templates];
        let pads = &pad_array[chan * n_templates..][..n_templates];
        let status = process_channel(
            &templates.channel(chan),
            image,
            &plans,
            scratch,
            used,
            pads,
            steps,
            &norm_failures,
            out_chan,
        );
        if status.is_err() {
            kernel_failures.fetch_add(1, Ordering::Relaxed);
        }
    };

    #[cfg(feature = "rayon")]
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| SeisCorrError::WorkerPool {
                reason: e.to_string(),
            })?;
        pool.install(|| {
            out.par_chunks_exact_mut(chan_len)
                .enumerate()
                .for_each(|(chan, out_chan)| {
                    // Each pool thread owns the arena at its own index,
                    // mirroring the per-thread workspaces of the C
                    // implementation; the lock is never contended.
                    let tid = rayon::current_thread_index().unwrap_or(0);
                    let mut scratch = arenas[tid]
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    run_channel(chan, out_chan, &mut scratch);
                });
        });
    }
    #[cfg(not(feature = "rayon"))]
    {
        let mut scratch = arenas[0].lock().unwrap_or_else(PoisonError::into_inner);
        for (chan, out_chan) in out.chunks_exact_mut(chan_len).enumerate() {
            run_channel(chan, out_chan, &mut scratch);
        }
    }

    let failed = kernel_failures.load(Ordering::Relaxed);
    if failed > 0 {
        return Err(SeisCorrError::CorrelationFailed { channels: failed });
    }
    let flagged = norm_failures.load(Ordering::Relaxed);
    if flagged > 0 {
        trace_event!("normalization_failures", count = flagged);
        return Err(SeisCorrError::NormalizationFailures { count: flagged });
    }

    stack_channels(out, chan_len, steps);
    Ok(())
}

/// Per-channel worker body: correlate, then gate, sanitize and pad each
/// template row in place.
#[allow(clippy::too_many_arguments)]
fn process_channel(
    batch: &TemplateBatch<'_>,
    image: &[f32],
    plans: &CorrelationPlans,
    scratch: &mut ScratchArena,
    used: &[bool],
    pads: &[usize],
    steps: usize,
    norm_failures: &AtomicUsize,
    out_chan: &mut [f32],
) -> SeisCorrResult<()> {
    ncc_fft_with(batch, image, plans, scratch, out_chan)?;

    for (t, row) in out_chan.chunks_exact_mut(steps).enumerate() {
        if !used[t] {
            row.fill(0.0);
        } else {
            let mut bad = 0usize;
            for value in row.iter_mut() {
                if value.is_nan() {
                    *value = 0.0;
                } else if value.abs() > CLIP_TOLERANCE {
                    bad += 1;
                } else if *value > 1.0 {
                    *value = 1.0;
                } else if *value < -1.0 {
                    *value = -1.0;
                }
            }
            if bad > 0 {
                norm_failures.fetch_add(bad, Ordering::Relaxed);
            }
        }

        // Rotation is diagnostic-gated: once anything anywhere has been
        // flagged, rows stay un-rotated so the caller sees raw lags.
        if norm_failures.load(Ordering::Relaxed) == 0 {
            let pad = pads[t];
            if pad >= steps {
                row.fill(0.0);
            } else if pad > 0 {
                row.copy_within(pad.., 0);
                row[steps - pad..].fill(0.0);
            }
        }
    }
    Ok(())
}

/// Sums channels 1.. into channel 0's slot, ascending, so the reduction
/// order (and therefore the bits of the result) never varies.
fn stack_channels(out: &mut [f32], chan_len: usize, steps: usize) {
    let (first, rest) = out.split_at_mut(chan_len);
    let rest = &rest[..];
    #[cfg(feature = "rayon")]
    {
        first
            .par_chunks_mut(steps)
            .enumerate()
            .for_each(|(t, row)| {
                for chunk in rest.chunks_exact(chan_len) {
                    for (acc, &v) in row.iter_mut().zip(&chunk[t * steps..][..steps]) {
                        *acc += v;
                    }
                }
            });
    }
    #[cfg(not(feature = "rayon"))]
    {
        for chunk in rest.chunks_exact(chan_len) {
            for (t, row) in first.chunks_exact_mut(steps).enumerate() {
                for (acc, &v) in row.iter_mut().zip(&chunk[t * steps..][..steps]) {
                    *acc += v;
                }
            }
        }
    }
}

fn check_len(what: &'static str, expected: usize, got: usize) -> SeisCorrResult<()> {
    if expected != got {
        return Err(SeisCorrError::LengthMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

fn worker_count(n_channels: usize, requested: Option<usize>) -> usize {
    let available = requested
        .or_else(|| {
            std::env::var(NUM_THREADS_ENV)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
        })
        .filter(|&n| n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
    available.min(n_channels).max(1)
}
