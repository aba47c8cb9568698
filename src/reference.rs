// reference.rs — CPU reference implementation of the reaction kernels.
//
// Mirrors shaders/reaction_diffusion.wgsl texel for texel: same stencil,
// same clamped borders, same field sampling, same 8-bit quantisation on
// store. The GPU kernels are validated against these functions, and the
// CPU backend runs them directly.
//
// CHANNEL MAPPING
// ───────────────
//   Fitzhugh-Nagumo / Gray-Scott:  R = u, G = v, B = u (display), A = 1
//   Belousov-Zhabotinsky:          R = a, G = b, B = c,           A = 1
//
// STENCIL
// ───────
// 3×3 weights 0.2 (orthogonal) and 0.05 (diagonal) sum to 1, giving a
// neighbourhood mean m; the Laplacian is m − centre.
//
// FIELD
// ─────
// The parameter field is sampled nearest-neighbour at
// (x · field_w / grid_w, y · field_h / grid_h), normalised to [0, 1], and
// scales one coefficient per model by (FIELD_BIAS + field), so a mid-grey
// field leaves the constants unchanged.

use crate::image::{from_unorm8, unorm8, Image, RgbaImage};
use crate::params::{ReactionDiffusionParameters, ReactionModel};

/// Offset added to the field before it scales a coefficient.
pub const FIELD_BIAS: f32 = 0.5;

const ORTHOGONAL_WEIGHT: f32 = 0.2;
const DIAGONAL_WEIGHT: f32 = 0.05;

/// Run one kernel dispatch over the whole grid: read `input`, write `output`.
///
/// # Panics
/// Panics if `input` and `output` differ in size.
pub fn step(
    model: ReactionModel,
    input: &RgbaImage,
    output: &mut RgbaImage,
    field: &Image<u8>,
    params: &ReactionDiffusionParameters,
) {
    assert_eq!(
        input.dimensions(),
        output.dimensions(),
        "simulation textures must share dimensions"
    );
    let (w, h) = (input.width(), input.height());
    for y in 0..h {
        let row = output.row_mut(y);
        for (x, out) in row.iter_mut().enumerate() {
            let f = sample_field(field, x, y, w, h);
            let centre = texel_f32(input.get(x, y));
            let mean = neighbourhood_mean(input, x, y);
            let next = match model {
                ReactionModel::FitzhughNagumo => fitzhugh_nagumo(centre, mean, f, params),
                ReactionModel::GrayScott => gray_scott(centre, mean, f, params),
                ReactionModel::BelousovZhabotinsky => belousov_zhabotinsky(mean, f, params),
            };
            *out = [unorm8(next[0]), unorm8(next[1]), unorm8(next[2]), unorm8(next[3])];
        }
    }
}

/// Normalised field value for grid texel (x, y).
pub fn sample_field(field: &Image<u8>, x: usize, y: usize, grid_w: usize, grid_h: usize) -> f32 {
    let fx = (x * field.width() / grid_w).min(field.width() - 1);
    let fy = (y * field.height() / grid_h).min(field.height() - 1);
    from_unorm8(field.get(fx, fy))
}

fn texel_f32(t: [u8; 4]) -> [f32; 4] {
    [from_unorm8(t[0]), from_unorm8(t[1]), from_unorm8(t[2]), from_unorm8(t[3])]
}

fn neighbourhood_mean(img: &RgbaImage, x: usize, y: usize) -> [f32; 4] {
    let (x, y) = (x as isize, y as isize);
    let mut acc = [0.0f32; 4];
    for (dx, dy, weight) in [
        (0, -1, ORTHOGONAL_WEIGHT),
        (0, 1, ORTHOGONAL_WEIGHT),
        (-1, 0, ORTHOGONAL_WEIGHT),
        (1, 0, ORTHOGONAL_WEIGHT),
        (-1, -1, DIAGONAL_WEIGHT),
        (1, -1, DIAGONAL_WEIGHT),
        (-1, 1, DIAGONAL_WEIGHT),
        (1, 1, DIAGONAL_WEIGHT),
    ] {
        let t = texel_f32(img.get_clamped(x + dx, y + dy));
        for c in 0..4 {
            acc[c] += weight * t[c];
        }
    }
    acc
}

fn fitzhugh_nagumo(
    centre: [f32; 4],
    mean: [f32; 4],
    field: f32,
    p: &ReactionDiffusionParameters,
) -> [f32; 4] {
    let (u, v) = (centre[0], centre[1]);
    let lap_u = mean[0] - u;
    let lap_v = mean[1] - v;
    let k1 = p.k1 * (FIELD_BIAS + field);

    let du = k1 * u - p.k2 * u * u - u * u * u - v + lap_u;
    let dv = p.epsilon * (p.k3 * u - p.a1 * v - p.a0) + p.delta * lap_v;

    let u = (u + p.timestep * du).clamp(0.0, 1.0);
    let v = (v + p.timestep * dv).clamp(0.0, 1.0);
    [u, v, u, 1.0]
}

fn gray_scott(
    centre: [f32; 4],
    mean: [f32; 4],
    field: f32,
    p: &ReactionDiffusionParameters,
) -> [f32; 4] {
    let (u, v) = (centre[0], centre[1]);
    let lap_u = mean[0] - u;
    let lap_v = mean[1] - v;
    let feed = p.f * (FIELD_BIAS + field);
    let uvv = u * v * v;

    let u = (u + p.du * lap_u - uvv + feed * (1.0 - u)).clamp(0.0, 1.0);
    let v = (v + p.dv * lap_v + uvv - (feed + p.k) * v).clamp(0.0, 1.0);
    [u, v, u, 1.0]
}

fn belousov_zhabotinsky(mean: [f32; 4], field: f32, p: &ReactionDiffusionParameters) -> [f32; 4] {
    let (a, b, c) = (mean[0], mean[1], mean[2]);
    let alpha = p.alpha * (FIELD_BIAS + field);

    let a2 = (a + a * (alpha * b - p.gamma * c)).clamp(0.0, 1.0);
    let b2 = (b + b * (p.beta * c - alpha * a)).clamp(0.0, 1.0);
    let c2 = (c + c * (p.gamma * a - p.beta * b)).clamp(0.0, 1.0);
    [a2, b2, c2, 1.0]
}

/// Mean and population variance of one channel, normalised to [0, 1].
pub fn channel_statistics(img: &RgbaImage, channel: usize) -> (f32, f32) {
    let n = (img.width() * img.height()) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for (_, _, t) in img.pixels() {
        let v = from_unorm8(t[channel]) as f64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / n;
    ((mean) as f32, (sum_sq / n - mean * mean).max(0.0) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(model: ReactionModel, input: &RgbaImage, field: &Image<u8>) -> RgbaImage {
        let mut out = RgbaImage::new(input.width(), input.height());
        step(model, input, &mut out, field, &ReactionDiffusionParameters::default());
        out
    }

    #[test]
    fn test_field_sampling_scales_coordinates() {
        // 2×1 field over a 4×2 grid: left half reads 0, right half reads 255.
        let field = Image::from_vec(2, 1, vec![0u8, 255]);
        assert_eq!(sample_field(&field, 0, 0, 4, 2), 0.0);
        assert_eq!(sample_field(&field, 1, 1, 4, 2), 0.0);
        assert_eq!(sample_field(&field, 2, 0, 4, 2), 1.0);
        assert_eq!(sample_field(&field, 3, 1, 4, 2), 1.0);
    }

    #[test]
    fn test_mean_of_uniform_image_is_centre() {
        let img = RgbaImage::filled(5, 5, [51, 102, 153, 255]);
        for (x, y) in [(0, 0), (2, 2), (4, 4)] {
            let m = neighbourhood_mean(&img, x, y);
            assert!((m[0] - 0.2).abs() < 1e-6);
            assert!((m[1] - 0.4).abs() < 1e-6);
            assert!((m[2] - 0.6).abs() < 1e-6);
        }
    }

    #[test]
    fn test_fitzhugh_nagumo_uniform_state_matches_reaction_only() {
        // On a uniform grid the Laplacian vanishes: one Euler step of the
        // reaction terms alone.
        let p = ReactionDiffusionParameters::default();
        let (u, v) = (0.4f32, 0.3f32);
        let input = RgbaImage::filled(8, 8, [unorm8(u), unorm8(v), unorm8(u), 255]);
        let field = Image::filled(1, 1, 128u8);
        let out = run(ReactionModel::FitzhughNagumo, &input, &field);

        let (u, v) = (from_unorm8(unorm8(u)), from_unorm8(unorm8(v)));
        let k1 = p.k1 * (FIELD_BIAS + 128.0 / 255.0);
        let du = k1 * u - p.k2 * u * u - u * u * u - v;
        let dv = p.epsilon * (p.k3 * u - p.a1 * v - p.a0);
        let expected = [unorm8(u + p.timestep * du), unorm8(v + p.timestep * dv)];
        for (_, _, t) in out.pixels() {
            assert_eq!([t[0], t[1]], expected);
            assert_eq!(t[2], t[0], "B mirrors u");
            assert_eq!(t[3], 255);
        }
    }

    #[test]
    fn test_output_does_not_depend_on_previous_output_contents() {
        let input = RgbaImage::from_fn(8, 8, |x, y| [(x * 30) as u8, (y * 30) as u8, 0, 255]);
        let field = Image::filled(2, 2, 200u8);
        let p = ReactionDiffusionParameters::default();
        let mut a = RgbaImage::filled(8, 8, [0; 4]);
        let mut b = RgbaImage::filled(8, 8, [255; 4]);
        step(ReactionModel::FitzhughNagumo, &input, &mut a, &field, &p);
        step(ReactionModel::FitzhughNagumo, &input, &mut b, &field, &p);
        assert_eq!(a, b);
    }

    #[test]
    fn test_gray_scott_fixed_point() {
        // u = 1, v = 0 is the trivial steady state of Gray-Scott.
        let input = RgbaImage::filled(6, 6, [255, 0, 255, 255]);
        let out = run(ReactionModel::GrayScott, &input, &Image::filled(1, 1, 0u8));
        assert_eq!(out, input);
    }

    #[test]
    fn test_belousov_zhabotinsky_field_changes_output() {
        let input = RgbaImage::from_fn(8, 8, |x, y| {
            [(40 + x * 20) as u8, (200 - y * 20) as u8, (60 + (x + y) * 10) as u8, 255]
        });
        let dark = run(ReactionModel::BelousovZhabotinsky, &input, &Image::filled(1, 1, 0u8));
        let bright = run(ReactionModel::BelousovZhabotinsky, &input, &Image::filled(1, 1, 255u8));
        assert_ne!(dark, bright);
        assert!(dark.pixels().all(|(_, _, t)| t[3] == 255));
    }

    #[test]
    fn test_channel_statistics() {
        let img = RgbaImage::from_vec(2, 1, vec![[0, 0, 0, 0], [255, 0, 0, 0]]);
        let (mean, var) = channel_statistics(&img, 0);
        assert!((mean - 0.5).abs() < 1e-6);
        assert!((var - 0.25).abs() < 1e-6);
        assert_eq!(channel_statistics(&img, 1), (0.0, 0.0));
    }
}
