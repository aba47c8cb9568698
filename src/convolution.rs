// convolution.rs — Separable Gaussian blur, CPU reference.
//
// The GPU blur splits into a horizontal compute pass and a vertical pass in
// the presentation fragment shader. This module is the reference both are
// checked against, and the blur the CPU backend actually runs.
//
// BORDER HANDLING: clamp (replicate edge texels), which is what a
// ClampToEdge sampler and a clamped `textureLoad` do on the GPU.

use crate::image::{Image, Pixel, RgbaImage};

/// Largest supported half-size. The GPU uniform carries 16 coefficients
/// (offsets 0..=15), which covers sigma up to 5.
pub const MAX_HALF_SIZE: usize = 15;

/// Half-size used for a given sigma: `ceil(3σ)`, at least 1.
pub fn half_size_for_sigma(sigma: f32) -> usize {
    (3.0 * sigma).ceil().max(1.0) as usize
}

/// Generate a normalised 1D Gaussian kernel of length `2 * half_size + 1`.
///
/// # Examples
/// ```
/// let k = rdcam::convolution::gaussian_kernel_1d(2, 1.0);
/// assert_eq!(k.len(), 5);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
pub fn gaussian_kernel_1d(half_size: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "sigma must be positive");
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..2 * half_size + 1)
        .map(|i| {
            let x = i as f32 - half_size as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Horizontal pass with clamped borders.
pub fn convolve_rows<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
    let half = (kernel.len() / 2) as isize;
    Image::from_fn(src.width(), src.height(), |x, y| {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, &kv)| {
                let sx = x as isize + ki as isize - half;
                src.get_clamped(sx, y as isize).to_f32() * kv
            })
            .sum()
    })
}

/// Vertical pass with clamped borders.
pub fn convolve_cols(src: &Image<f32>, kernel: &[f32]) -> Image<f32> {
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
    let half = (kernel.len() / 2) as isize;
    Image::from_fn(src.width(), src.height(), |x, y| {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, &kv)| {
                let sy = y as isize + ki as isize - half;
                src.get_clamped(x as isize, sy) * kv
            })
            .sum()
    })
}

/// Full separable 2D convolution: rows then columns.
pub fn convolve_separable<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    convolve_cols(&convolve_rows(src, kernel), kernel)
}

/// Gaussian-blur every channel of an RGBA image at its own resolution.
pub fn gaussian_blur_rgba(src: &RgbaImage, sigma: f32) -> RgbaImage {
    let kernel = gaussian_kernel_1d(half_size_for_sigma(sigma), sigma);
    let planes: Vec<Image<f32>> = (0..4)
        .map(|c| convolve_separable(&src.channel(c), &kernel))
        .collect();
    Image::from_fn(src.width(), src.height(), |x, y| {
        let mut texel = [0u8; 4];
        for (c, plane) in planes.iter().enumerate() {
            texel[c] = u8::from_f32(plane.get(x, y));
        }
        texel
    })
}
