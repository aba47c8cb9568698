// image.rs — Runtime-sized image container shared by the CPU side of the
// pipeline.
//
// Three kinds of image flow through the crate:
//
//   Image<u8>       camera luminance plane (the parameter field), possibly
//                   with row padding because capture drivers hand out
//                   planes whose bytes-per-row exceeds the width.
//   Image<f32>      intermediate blur accumulators.
//   RgbaImage       simulation state / seed data / display buffer:
//                   one [u8; 4] per texel, byte order R, G, B, A, which is
//                   exactly the memory layout of an Rgba8Unorm texture row.
//
// Memory layout (stride = 5, width = 4):
//
//   data index:  0  1  2  3 [4]  5  6  7  8 [9]
//   pixel:       ■  ■  ■  ■  ·   ■  ■  ■  ■  ·
//   row:         |--- row 0 ---|  |--- row 1 ---|
//
// Padding elements are never read by accessors; uploads compact them away.

use std::fmt;

// ---------------------------------------------------------------------------
// Texel / Pixel traits
// ---------------------------------------------------------------------------

/// Anything that can be stored in an `Image`.
///
/// Blanket-implemented for every plain `Copy` value type, so `[u8; 4]`
/// texels work without a wrapper.
pub trait Texel: Copy + Default + Send + Sync + 'static {}

impl<T: Copy + Default + Send + Sync + 'static> Texel for T {}

/// Scalar texels that convert to and from `f32` for filtering.
pub trait Pixel: Texel + PartialOrd {
    /// Convert to f32 (raw value, not normalised).
    fn to_f32(self) -> f32;

    /// Construct from an f32 value with clamping/rounding as appropriate.
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        // `as u8` truncates, so clamp and round first.
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

/// Convert a normalised [0, 1] value to an 8-bit channel, rounding to
/// nearest. Matches the conversion a GPU performs when storing to an
/// `Rgba8Unorm` storage texture.
#[inline]
pub fn unorm8(v: f32) -> u8 {
    u8::from_f32(v * 255.0)
}

/// Convert an 8-bit channel to a normalised [0, 1] value.
#[inline]
pub fn from_unorm8(v: u8) -> f32 {
    v as f32 / 255.0
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A 2D image with runtime dimensions, generic over texel type `T`.
#[derive(Clone, PartialEq)]
pub struct Image<T: Texel> {
    /// Texel data in row-major order. Length = height * stride.
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in elements. stride >= width.
    stride: usize,
}

/// RGBA8 image, one `[r, g, b, a]` per texel.
pub type RgbaImage = Image<[u8; 4]>;

impl<T: Texel> Image<T> {
    /// Create a default-initialised image (stride == width).
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, T::default())
    }

    /// Create an image with every texel set to `value`.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Image { data: vec![value; width * height], width, height, stride: width }
    }

    /// Create an image from a compact texel vector.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image { data, width, height, stride: width }
    }

    /// Create an image from rows padded to `stride` elements.
    ///
    /// # Panics
    /// Panics if `stride < width` or `data.len() != height * stride`.
    pub fn from_vec_with_stride(width: usize, height: usize, stride: usize, data: Vec<T>) -> Self {
        assert!(stride >= width, "stride ({stride}) must be >= width ({width})");
        assert_eq!(
            data.len(),
            height * stride,
            "data length ({}) must equal height * stride ({})",
            data.len(),
            height * stride,
        );
        Image { data, width, height, stride }
    }

    /// Build an image by evaluating `f(x, y)` for every texel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image { data, width, height, stride: width }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `(width, height)` as `u32`, the form wgpu extents want.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }

    /// Texel at (x, y). Panics if out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    /// Texel at (x, y) with coordinates clamped to the image edge.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.stride + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        self.data[idx] = value;
    }

    /// Borrow row `y` without stride padding.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Iterate over all texels as `(x, y, value)`, skipping padding.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// Flat buffer including stride padding.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Return a copy with padding removed (stride == width).
    pub fn to_compact(&self) -> Self {
        if self.stride == self.width {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            data.extend_from_slice(self.row(y));
        }
        Image { data, width: self.width, height: self.height, stride: self.width }
    }

    /// Nearest-neighbour resample to `width × height`.
    ///
    /// Source coordinate for destination x is `x * src_w / dst_w`, the same
    /// integer mapping the kernels use to sample the parameter field.
    pub fn resize_nearest(&self, width: usize, height: usize) -> Self {
        Image::from_fn(width, height, |x, y| {
            let sx = x * self.width / width.max(1);
            let sy = y * self.height / height.max(1);
            self.get(sx.min(self.width - 1), sy.min(self.height - 1))
        })
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl RgbaImage {
    /// Raw bytes of a compact RGBA image (R, G, B, A per texel).
    ///
    /// # Panics
    /// Panics if the image carries row padding.
    pub fn as_bytes(&self) -> &[u8] {
        assert_eq!(self.stride, self.width, "as_bytes requires a compact image");
        bytemuck::cast_slice(&self.data)
    }

    /// Build from raw R, G, B, A bytes.
    ///
    /// Returns `None` if `bytes.len() != width * height * 4`.
    pub fn from_rgba_bytes(width: usize, height: usize, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != width * height * 4 {
            return None;
        }
        let data: Vec<[u8; 4]> = bytes
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Some(Image::from_vec(width, height, data))
    }

    /// Extract one channel as a scalar plane.
    pub fn channel(&self, c: usize) -> Image<u8> {
        assert!(c < 4, "channel index {c} out of range");
        Image::from_fn(self.width, self.height, |x, y| self.get(x, y)[c])
    }
}

impl<T: Texel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{}, stride={} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.stride,
        )?;
        for y in 0..self.height.min(4) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(8) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 8 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 4 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

impl<T: Texel> std::ops::Index<(usize, usize)> for Image<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        self.bounds_check(x, y);
        &self.data[y * self.stride + x]
    }
}
