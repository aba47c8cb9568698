// tests/test_reference.rs — CPU reaction kernels and the display blur.

use rdcam::convolution::gaussian_blur_rgba;
use rdcam::image::{Image, RgbaImage};
use rdcam::params::{ReactionDiffusionParameters, ReactionModel};
use rdcam::reference::{channel_statistics, sample_field, step};
use rdcam::seed::{NoiseSeed, SeedSource};

const MODELS: [ReactionModel; 3] = [
    ReactionModel::FitzhughNagumo,
    ReactionModel::GrayScott,
    ReactionModel::BelousovZhabotinsky,
];

fn run(model: ReactionModel, input: &RgbaImage, field: &Image<u8>) -> RgbaImage {
    let mut out = RgbaImage::new(input.width(), input.height());
    step(model, input, &mut out, field, &ReactionDiffusionParameters::default());
    out
}

// ===== Kernels =====

#[test]
fn uniform_state_stays_uniform() {
    // Clamped borders see the same neighbourhood as the interior, so a
    // uniform state under a uniform field has a uniform successor.
    let input = RgbaImage::filled(24, 16, [150, 90, 40, 255]);
    let field = Image::filled(6, 4, 100u8);
    for model in MODELS {
        let out = run(model, &input, &field);
        let first = out.get(0, 0);
        assert!(
            out.pixels().all(|(_, _, t)| t == first),
            "{model}: uniform input produced a non-uniform output"
        );
        assert_eq!(first[3], 255, "{model}: alpha must stay opaque");
    }
}

#[test]
fn fitzhugh_nagumo_rest_state_is_fixed() {
    // u = v = 0: the reaction pushes v negative and the clamp holds it at 0.
    let input = RgbaImage::filled(16, 16, [0, 0, 0, 255]);
    let out = run(ReactionModel::FitzhughNagumo, &input, &Image::filled(1, 1, 255u8));
    assert!(out.pixels().all(|(_, _, t)| t == [0, 0, 0, 255]));
}

#[test]
fn fitzhugh_nagumo_mirrors_activator_into_blue() {
    let input = NoiseSeed { smoothness: 2.0, seed: 9 }.produce(32, 32).unwrap();
    let out = run(ReactionModel::FitzhughNagumo, &input, &Image::filled(8, 8, 128u8));
    for (x, y, t) in out.pixels() {
        assert_eq!(t[0], t[2], "R and B differ at ({x},{y})");
    }
}

#[test]
fn step_is_deterministic() {
    let input = NoiseSeed::default().produce(48, 32).unwrap();
    let field = Image::from_fn(12, 8, |x, y| (x * 20 + y * 10) as u8);
    for model in MODELS {
        assert_eq!(run(model, &input, &field), run(model, &input, &field), "{model}");
    }
}

#[test]
fn field_only_acts_where_it_is_bright() {
    // Left half of the field dark, right half bright: the left half of the
    // output matches an all-dark run, the right half an all-bright run.
    let input = NoiseSeed { smoothness: 3.0, seed: 4 }.produce(32, 16).unwrap();
    let split = Image::from_fn(2, 1, |x, _| if x == 0 { 0u8 } else { 255 });
    let mixed = run(ReactionModel::FitzhughNagumo, &input, &split);
    let dark = run(ReactionModel::FitzhughNagumo, &input, &Image::filled(1, 1, 0u8));
    let bright = run(ReactionModel::FitzhughNagumo, &input, &Image::filled(1, 1, 255u8));

    for (x, y, t) in mixed.pixels() {
        let expected = if x < 16 { dark.get(x, y) } else { bright.get(x, y) };
        assert_eq!(t, expected, "texel ({x},{y})");
    }
}

#[test]
fn field_sampling_covers_whole_field() {
    let field = Image::from_fn(4, 2, |x, y| (y * 4 + x) as u8 * 30);
    // Grid 8×4 over a 4×2 field: every field texel covers a 2×2 block.
    assert_eq!(sample_field(&field, 0, 0, 8, 4), 0.0);
    assert_eq!(sample_field(&field, 7, 0, 8, 4), 90.0 / 255.0);
    assert_eq!(sample_field(&field, 7, 3, 8, 4), 210.0 / 255.0);
    // A field larger than the grid is decimated, never read out of bounds.
    let big = Image::filled(100, 100, 255u8);
    assert_eq!(sample_field(&big, 7, 3, 8, 4), 1.0);
}

// ===== Statistics =====

#[test]
fn white_noise_statistics() {
    let noise = NoiseSeed { smoothness: 1.0, seed: 1 }.produce(128, 128).unwrap();
    for c in 0..3 {
        let (mean, var) = channel_statistics(&noise, c);
        assert!((mean - 0.5).abs() < 0.03, "channel {c} mean {mean}");
        // Uniform on [0, 1]: variance 1/12.
        assert!((var - 1.0 / 12.0).abs() < 0.01, "channel {c} variance {var}");
    }
    let (alpha_mean, alpha_var) = channel_statistics(&noise, 3);
    assert_eq!((alpha_mean, alpha_var), (1.0, 0.0));
}

// ===== Display blur =====

#[test]
fn blur_of_constant_image_is_constant() {
    let img = RgbaImage::filled(40, 30, [10, 100, 200, 255]);
    let blurred = gaussian_blur_rgba(&img, 3.0);
    assert_eq!(blurred, img);
}

#[test]
fn blur_smooths_noise_and_keeps_mean() {
    let noise = NoiseSeed { smoothness: 1.0, seed: 77 }.produce(96, 64).unwrap();
    let blurred = gaussian_blur_rgba(&noise, 3.0);
    for c in 0..3 {
        let (m0, v0) = channel_statistics(&noise, c);
        let (m1, v1) = channel_statistics(&blurred, c);
        assert!((m0 - m1).abs() < 0.02, "channel {c} mean moved {m0} → {m1}");
        assert!(v1 < v0 * 0.25, "channel {c} variance {v0} → {v1}");
    }
}

#[test]
fn blur_spreads_a_point_symmetrically() {
    let mut img = RgbaImage::filled(21, 21, [0, 0, 0, 255]);
    img.set(10, 10, [255, 255, 255, 255]);
    let blurred = gaussian_blur_rgba(&img, 2.0);
    let centre = blurred.get(10, 10)[0];
    assert!(centre > 0 && centre < 255);
    for d in 1..5 {
        let left = blurred.get(10 - d, 10)[0] as i32;
        for other in [blurred.get(10 + d, 10), blurred.get(10, 10 - d), blurred.get(10, 10 + d)] {
            // Row-then-column order can differ by one rounding step.
            assert!((left - other[0] as i32).abs() <= 1, "distance {d}");
        }
        assert!(left <= centre as i32);
    }
}
