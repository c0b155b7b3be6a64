//! Multi-channel orchestration: gating, stacking, padding, sanitization.

use seiscorr::{
    fft_len_for, ncc_fft, ncc_fft_multi, prepare_templates, MultiTemplates, TemplateBatch,
};

fn make_signal(len: usize, phase: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32;
            (0.27 * t + phase).sin() + 0.4 * (0.093 * t).cos()
        })
        .collect()
}

/// One prepared template row cut from the given image.
fn cut_template(image: &[f32], at: usize, len: usize) -> Vec<f32> {
    let mut template: Vec<f32> = image[at..at + len].to_vec();
    prepare_templates(&mut template, len).unwrap();
    template
}

#[test]
fn single_channel_equals_ncc_fft() {
    let template_len = 24;
    let image = make_signal(256, 0.4);
    let template = cut_template(&image, 100, template_len);
    let fft_len = fft_len_for(template_len, image.len());
    let steps = image.len() - template_len + 1;

    let batch = TemplateBatch::new(&template, 1, template_len).unwrap();
    let mut expected = vec![0.0f32; steps];
    ncc_fft(&batch, &image, fft_len, &mut expected).unwrap();

    let multi = MultiTemplates::new(&template, 1, 1, template_len).unwrap();
    let mut out = vec![0.0f32; steps];
    ncc_fft_multi(
        &multi,
        &image,
        image.len(),
        fft_len,
        &[true],
        &[0],
        &mut out,
    )
    .unwrap();

    for (k, (e, o)) in expected.iter().zip(&out).enumerate() {
        // The multi path clamps values a hair above 1.0; otherwise the
        // single-channel stack is the channel itself.
        let clamped = e.clamp(-1.0, 1.0);
        assert!((clamped - o).abs() < 1e-6, "lag {k}: {clamped} vs {o}");
    }
}

#[test]
fn identical_channels_stack_to_double() {
    let template_len = 16;
    let image = make_signal(128, 1.1);
    let template = cut_template(&image, 50, template_len);
    let fft_len = fft_len_for(template_len, image.len());
    let steps = image.len() - template_len + 1;

    let mut templates = template.clone();
    templates.extend_from_slice(&template);
    let mut images = image.clone();
    images.extend_from_slice(&image);

    let multi = MultiTemplates::new(&templates, 2, 1, template_len).unwrap();
    let mut out = vec![0.0f32; 2 * steps];
    ncc_fft_multi(
        &multi,
        &images,
        image.len(),
        fft_len,
        &[true, true],
        &[0, 0],
        &mut out,
    )
    .unwrap();

    let batch = TemplateBatch::new(&template, 1, template_len).unwrap();
    let mut single = vec![0.0f32; steps];
    ncc_fft(&batch, &image, fft_len, &mut single).unwrap();

    for (k, (s, o)) in single.iter().zip(&out[..steps]).enumerate() {
        let expected = 2.0 * s.clamp(-1.0, 1.0);
        assert!((expected - o).abs() < 1e-5, "lag {k}: {expected} vs {o}");
    }
    assert!((out[50] - 2.0).abs() < 1e-3, "stacked peak = {}", out[50]);
}

#[test]
fn gated_channel_contributes_nothing() {
    let template_len = 16;
    let image = make_signal(128, 1.1);
    let template = cut_template(&image, 50, template_len);
    let fft_len = fft_len_for(template_len, image.len());
    let steps = image.len() - template_len + 1;

    let mut templates = template.clone();
    templates.extend_from_slice(&template);
    let mut images = image.clone();
    images.extend_from_slice(&image);

    let multi = MultiTemplates::new(&templates, 2, 1, template_len).unwrap();
    let mut out = vec![0.0f32; 2 * steps];
    ncc_fft_multi(
        &multi,
        &images,
        image.len(),
        fft_len,
        &[true, false],
        &[0, 0],
        &mut out,
    )
    .unwrap();

    let batch = TemplateBatch::new(&template, 1, template_len).unwrap();
    let mut single = vec![0.0f32; steps];
    ncc_fft(&batch, &image, fft_len, &mut single).unwrap();

    for (s, o) in single.iter().zip(&out[..steps]) {
        assert!((s.clamp(-1.0, 1.0) - o).abs() < 1e-6);
    }
}

#[test]
fn stacking_is_additive_over_distinct_channels() {
    let template_len = 20;
    let n_channels = 3;
    let image_len = 160;
    let fft_len = fft_len_for(template_len, image_len);
    let steps = image_len - template_len + 1;

    let mut templates = Vec::new();
    let mut images = Vec::new();
    let mut per_channel = Vec::new();
    for c in 0..n_channels {
        let image = make_signal(image_len, c as f32 * 0.9);
        let template = cut_template(&image, 30 + 10 * c, template_len);
        let batch = TemplateBatch::new(&template, 1, template_len).unwrap();
        let mut row = vec![0.0f32; steps];
        ncc_fft(&batch, &image, fft_len, &mut row).unwrap();
        for v in row.iter_mut() {
            *v = v.clamp(-1.0, 1.0);
        }
        per_channel.push(row);
        templates.extend_from_slice(&template);
        images.extend_from_slice(&image);
    }

    let multi = MultiTemplates::new(&templates, n_channels, 1, template_len).unwrap();
    let mut out = vec![0.0f32; n_channels * steps];
    ncc_fft_multi(
        &multi,
        &images,
        image_len,
        fft_len,
        &[true; 3],
        &[0; 3],
        &mut out,
    )
    .unwrap();

    for k in 0..steps {
        let expected: f32 = per_channel.iter().map(|row| row[k]).sum();
        assert!(
            (expected - out[k]).abs() < 1e-5,
            "lag {k}: {expected} vs {}",
            out[k]
        );
    }
}

#[test]
fn pad_rotates_rows_left() {
    let template_len = 16;
    let pad = 3usize;
    let image = make_signal(96, 0.2);
    let template = cut_template(&image, 40, template_len);
    let fft_len = fft_len_for(template_len, image.len());
    let steps = image.len() - template_len + 1;

    let multi = MultiTemplates::new(&template, 1, 1, template_len).unwrap();
    let mut unpadded = vec![0.0f32; steps];
    ncc_fft_multi(
        &multi,
        &image,
        image.len(),
        fft_len,
        &[true],
        &[0],
        &mut unpadded,
    )
    .unwrap();

    let mut padded = vec![0.0f32; steps];
    ncc_fft_multi(
        &multi,
        &image,
        image.len(),
        fft_len,
        &[true],
        &[pad],
        &mut padded,
    )
    .unwrap();

    for k in 0..steps - pad {
        assert!(
            (padded[k] - unpadded[k + pad]).abs() < 1e-6,
            "lag {k}: {} vs {}",
            padded[k],
            unpadded[k + pad]
        );
    }
    assert!(padded[steps - pad..].iter().all(|&v| v == 0.0));
}

#[test]
fn nan_channel_is_sanitized_to_zero() {
    let template_len = 16;
    let image = make_signal(128, 0.5);
    let template = cut_template(&image, 60, template_len);
    let fft_len = fft_len_for(template_len, image.len());
    let steps = image.len() - template_len + 1;

    let mut templates = template.clone();
    templates.extend_from_slice(&template);
    let mut images = image.clone();
    let mut poisoned = image.clone();
    poisoned[64] = f32::NAN;
    images.extend_from_slice(&poisoned);

    let multi = MultiTemplates::new(&templates, 2, 1, template_len).unwrap();
    let mut out = vec![0.0f32; 2 * steps];
    ncc_fft_multi(
        &multi,
        &images,
        image.len(),
        fft_len,
        &[true, true],
        &[0, 0],
        &mut out,
    )
    .unwrap();

    // The poisoned channel's row collapses to zeros, so the stack is the
    // clean channel alone.
    let batch = TemplateBatch::new(&template, 1, template_len).unwrap();
    let mut single = vec![0.0f32; steps];
    ncc_fft(&batch, &image, fft_len, &mut single).unwrap();
    for (s, o) in single.iter().zip(&out[..steps]) {
        assert!((s.clamp(-1.0, 1.0) - o).abs() < 1e-6);
    }
}

#[test]
fn multiple_templates_per_channel() {
    let template_len = 16;
    let image = make_signal(192, 2.4);
    let t0 = cut_template(&image, 25, template_len);
    let t1 = cut_template(&image, 90, template_len);
    let fft_len = fft_len_for(template_len, image.len());
    let steps = image.len() - template_len + 1;

    let mut templates = t0.clone();
    templates.extend_from_slice(&t1);
    let multi = MultiTemplates::new(&templates, 1, 2, template_len).unwrap();
    let mut out = vec![0.0f32; 2 * steps];
    ncc_fft_multi(
        &multi,
        &image,
        image.len(),
        fft_len,
        &[true, true],
        &[0, 0],
        &mut out,
    )
    .unwrap();

    assert!((out[25] - 1.0).abs() < 1e-3, "t0 peak = {}", out[25]);
    assert!((out[steps + 90] - 1.0).abs() < 1e-3, "t1 peak = {}", out[steps + 90]);
}
