// seed.rs — Initial simulation state.
//
// A seed is one W×H RGBA8 buffer, bytes in R, G, B, A order with
// premultiplied alpha. The driver asks its `SeedSource` for one on the
// first frame and writes the same bytes into both simulation textures.
//
// Sources:
//   NoiseSeed   procedural value noise; `smoothness` is the lattice spacing
//               in texels (1 = independent uniform noise per texel).
//   ImageSeed   decode an image file or in-memory bytes, resample to W×H.
//   StaticSeed  caller-provided buffer, used as-is.
//
// Producing the same seed twice yields identical bytes for every source.

use std::path::PathBuf;

use image::imageops::FilterType;

use crate::image::{Image, RgbaImage};

/// Errors producing seed data. All are fatal to the simulation.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to decode seed image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("seed is {got_width}×{got_height}, grid is {width}×{height}")]
    SizeMismatch { width: u32, height: u32, got_width: u32, got_height: u32 },
}

/// Supplier of the initial simulation state.
pub trait SeedSource: Send {
    /// Produce a `width × height` RGBA8 seed.
    fn produce(&self, width: u32, height: u32) -> Result<RgbaImage, SeedError>;
}

// ---------------------------------------------------------------------------
// NoiseSeed
// ---------------------------------------------------------------------------

/// Smooth value noise, independent per colour channel, opaque alpha.
#[derive(Debug, Clone, Copy)]
pub struct NoiseSeed {
    /// Lattice spacing in texels. Values <= 1 give white noise.
    pub smoothness: f32,
    /// Hash seed; equal seeds give equal noise.
    pub seed: u64,
}

impl Default for NoiseSeed {
    fn default() -> Self {
        NoiseSeed { smoothness: 4.0, seed: 0x5eed }
    }
}

impl NoiseSeed {
    fn lattice(&self, x: i64, y: i64, channel: u64) -> f32 {
        let h = splitmix64(
            self.seed
                ^ (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
                ^ (y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
                ^ channel.wrapping_mul(0x1656_67B1_9E37_79F9),
        );
        // Top 8 bits → one of 256 evenly spaced levels in [0, 1].
        (h >> 56) as f32 / 255.0
    }

    fn sample(&self, x: usize, y: usize, channel: u64) -> f32 {
        let spacing = self.smoothness.max(1.0);
        let fx = x as f32 / spacing;
        let fy = y as f32 / spacing;
        let (x0, y0) = (fx.floor(), fy.floor());
        let (tx, ty) = (smoothstep(fx - x0), smoothstep(fy - y0));
        let (ix, iy) = (x0 as i64, y0 as i64);

        let v00 = self.lattice(ix, iy, channel);
        let v10 = self.lattice(ix + 1, iy, channel);
        let v01 = self.lattice(ix, iy + 1, channel);
        let v11 = self.lattice(ix + 1, iy + 1, channel);
        let top = v00 + (v10 - v00) * tx;
        let bottom = v01 + (v11 - v01) * tx;
        top + (bottom - top) * ty
    }
}

impl SeedSource for NoiseSeed {
    fn produce(&self, width: u32, height: u32) -> Result<RgbaImage, SeedError> {
        Ok(Image::from_fn(width as usize, height as usize, |x, y| {
            let mut texel = [255u8; 4];
            for (c, slot) in texel.iter_mut().take(3).enumerate() {
                *slot = crate::image::unorm8(self.sample(x, y, c as u64));
            }
            texel
        }))
    }
}

#[inline]
fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// ---------------------------------------------------------------------------
// ImageSeed
// ---------------------------------------------------------------------------

/// Where an `ImageSeed` reads its encoded bytes from.
#[derive(Debug, Clone)]
enum ImageOrigin {
    Path(PathBuf),
    Memory(Vec<u8>),
}

/// Seed decoded from an encoded image (PNG, JPEG), stretched to the grid.
#[derive(Debug, Clone)]
pub struct ImageSeed {
    origin: ImageOrigin,
}

impl ImageSeed {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        ImageSeed { origin: ImageOrigin::Path(path.into()) }
    }

    pub fn from_memory(bytes: Vec<u8>) -> Self {
        ImageSeed { origin: ImageOrigin::Memory(bytes) }
    }
}

impl SeedSource for ImageSeed {
    fn produce(&self, width: u32, height: u32) -> Result<RgbaImage, SeedError> {
        let decoded = match &self.origin {
            ImageOrigin::Path(path) => image::open(path)?,
            ImageOrigin::Memory(bytes) => image::load_from_memory(bytes)?,
        };
        let rgba = decoded.to_rgba8();
        let resized = if rgba.dimensions() == (width, height) {
            rgba
        } else {
            image::imageops::resize(&rgba, width, height, FilterType::Triangle)
        };
        let mut seed = RgbaImage::from_rgba_bytes(width as usize, height as usize, resized.as_raw())
            .ok_or(SeedError::SizeMismatch {
                width,
                height,
                got_width: resized.width(),
                got_height: resized.height(),
            })?;
        premultiply(&mut seed);
        Ok(seed)
    }
}

/// Multiply colour channels by alpha in place.
pub fn premultiply(img: &mut RgbaImage) {
    for texel in img.as_mut_slice() {
        let a = texel[3] as u32;
        for c in &mut texel[..3] {
            *c = ((*c as u32 * a + 127) / 255) as u8;
        }
    }
}

// ---------------------------------------------------------------------------
// StaticSeed
// ---------------------------------------------------------------------------

/// A fixed, already premultiplied buffer.
#[derive(Debug, Clone)]
pub struct StaticSeed(pub RgbaImage);

impl SeedSource for StaticSeed {
    fn produce(&self, width: u32, height: u32) -> Result<RgbaImage, SeedError> {
        let (got_width, got_height) = self.0.dimensions();
        if (got_width, got_height) != (width, height) {
            return Err(SeedError::SizeMismatch { width, height, got_width, got_height });
        }
        Ok(self.0.clone())
    }
}
