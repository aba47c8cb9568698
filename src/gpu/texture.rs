// gpu/texture.rs — Simulation texture pair, parameter field texture, and
// CPU↔GPU transfers.
//
// TEXTURES
// ─────────
//   SimulationPair   two Rgba8Unorm W×H textures, A and B. Each is read as
//                    `texture_2d<f32>` by one dispatch and written as
//                    `texture_storage_2d<rgba8unorm, write>` by the next.
//   FieldTexture     R8Unorm at the camera plane's own size, reallocated
//                    when a plane of a different size arrives.
//
// UPLOAD ORDERING
// ────────────────
// Seeds go through a staging buffer and `copy_buffer_to_texture` recorded
// into the frame's encoder, so they land before the first dispatch of the
// same command buffer. The field goes through `Queue::write_texture`,
// which wgpu orders before any later `submit`. Either way the frame's
// kernels see the new data and nothing blocks.
//
// THE STRIDE-COMPACTION PROBLEM
// ──────────────────────────────
// Capture planes often carry row padding (stride > width). Copies from a
// buffer want rows at `bytes_per_row` (a multiple of 256 for
// buffer→texture copies), so rows are always re-packed before upload:
//
//   CPU (stride=5, width=4):   [p p p p _] [p p p p _] ...
//   staging (aligned=256):     [p p p p 0 ... 0] [p p p p 0 ... 0] ...

use wgpu::util::DeviceExt;

use crate::gpu::device::{GpuDevice, GpuError};
use crate::image::{Image, RgbaImage};
use crate::pingpong::{BufferIndex, PingPong};

/// Simulation state format. One byte per channel, R = u, G = v.
pub const SIMULATION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Parameter field format.
pub const FIELD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

// ---------------------------------------------------------------------------
// Simulation textures
// ---------------------------------------------------------------------------

/// One simulation buffer: an Rgba8Unorm texture + one view used for both
/// the read binding and the storage binding.
pub struct SimulationTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl SimulationTexture {
    fn new(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SIMULATION_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST   // seeding
                | wgpu::TextureUsages::COPY_SRC,  // readback
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        SimulationTexture { texture, view, width, height }
    }

    /// Read the texture back to CPU memory.
    ///
    /// **Expensive and synchronous**; stalls until all submitted work is
    /// done. Tests, demos and benchmarks only.
    pub fn readback(&self, gpu: &GpuDevice) -> Result<RgbaImage, GpuError> {
        let bytes = read_texture(gpu, &self.texture, self.width, self.height, 4)?;
        RgbaImage::from_rgba_bytes(self.width as usize, self.height as usize, &bytes)
            .ok_or(GpuError::ReadbackAbandoned)
    }
}

/// The two simulation textures, both exactly W×H.
pub struct SimulationPair {
    textures: PingPong<SimulationTexture>,
    width: u32,
    height: u32,
}

impl SimulationPair {
    /// Allocate A and B. Contents are undefined until seeded.
    pub fn new(gpu: &GpuDevice, width: u32, height: u32) -> Self {
        let a = SimulationTexture::new(&gpu.device, width, height, "simulation A");
        let b = SimulationTexture::new(&gpu.device, width, height, "simulation B");
        SimulationPair { textures: PingPong::new(a, b), width, height }
    }

    pub fn get(&self, index: BufferIndex) -> &SimulationTexture {
        self.textures.get(index)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Record copies writing the same `seed` bytes into A and B.
    ///
    /// # Panics
    /// Panics if `seed` is not W×H; the driver checks this first.
    pub fn record_seed(&self, gpu: &GpuDevice, encoder: &mut wgpu::CommandEncoder, seed: &RgbaImage) {
        assert_eq!(seed.dimensions(), (self.width, self.height), "seed size mismatch");

        let aligned_bytes_per_row = align_to(self.width * 4, COPY_ALIGNMENT);
        let staging = pack_rows(seed.as_slice(), seed.stride(), self.width, self.height, aligned_bytes_per_row);
        let staging_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("seed staging"),
            contents: &staging,
            usage: wgpu::BufferUsages::COPY_SRC,
        });

        for tex in self.textures.iter() {
            encoder.copy_buffer_to_texture(
                wgpu::ImageCopyBuffer {
                    buffer: &staging_buf,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(aligned_bytes_per_row),
                        rows_per_image: Some(self.height),
                    },
                },
                wgpu::ImageCopyTexture {
                    texture: &tex.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter field
// ---------------------------------------------------------------------------

/// The camera luminance plane resident on the GPU.
pub struct FieldTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl FieldTexture {
    pub fn new(gpu: &GpuDevice, width: u32, height: u32) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("parameter field"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FIELD_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        FieldTexture { texture, view, width, height }
    }

    /// Queue a write of `src` into the texture.
    ///
    /// # Panics
    /// Panics if `src` is not this texture's size.
    pub fn write(&self, gpu: &GpuDevice, src: &Image<u8>) {
        assert_eq!(src.dimensions(), (self.width, self.height), "field size mismatch");
        let aligned_bytes_per_row = align_to(self.width, COPY_ALIGNMENT);
        let staging = pack_rows(src.as_slice(), src.stride(), self.width, self.height, aligned_bytes_per_row);
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &staging,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(aligned_bytes_per_row),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
        );
    }

    /// Read the field back (tests only).
    pub fn readback(&self, gpu: &GpuDevice) -> Result<Image<u8>, GpuError> {
        let bytes = read_texture(gpu, &self.texture, self.width, self.height, 1)?;
        Ok(Image::from_vec(self.width as usize, self.height as usize, bytes))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Re-pack `height` rows of `width` texels from a strided slice into rows
/// of `aligned_bytes_per_row` bytes.
fn pack_rows<T: bytemuck::Pod>(
    src: &[T],
    stride: usize,
    width: u32,
    height: u32,
    aligned_bytes_per_row: u32,
) -> Vec<u8> {
    let texel = std::mem::size_of::<T>();
    let row_bytes = width as usize * texel;
    let mut staging = vec![0u8; (aligned_bytes_per_row * height) as usize];
    for y in 0..height as usize {
        let src_row: &[u8] = bytemuck::cast_slice(&src[y * stride..y * stride + width as usize]);
        let dst_start = y * aligned_bytes_per_row as usize;
        staging[dst_start..dst_start + row_bytes].copy_from_slice(src_row);
    }
    staging
}

/// Copy a texture into a mappable buffer, wait, and return compact rows.
pub(crate) fn read_texture(
    gpu: &GpuDevice,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    bytes_per_texel: u32,
) -> Result<Vec<u8>, GpuError> {
    let row_bytes = width * bytes_per_texel;
    let aligned_bytes_per_row = align_to(row_bytes, COPY_ALIGNMENT);
    let readback_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("texture readback"),
        size: (aligned_bytes_per_row * height) as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.device.create_command_encoder(
        &wgpu::CommandEncoderDescriptor { label: Some("texture readback") },
    );
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &readback_buf,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(aligned_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let buf_slice = readback_buf.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buf_slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    gpu.device.poll(wgpu::Maintain::Wait);
    rx.recv().map_err(|_| GpuError::ReadbackAbandoned)??;

    let mapped = buf_slice.get_mapped_range();
    let mut out = Vec::with_capacity((row_bytes * height) as usize);
    for y in 0..height as usize {
        let start = y * aligned_bytes_per_row as usize;
        out.extend_from_slice(&mapped[start..start + row_bytes as usize]);
    }
    drop(mapped);
    readback_buf.unmap();
    Ok(out)
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(257, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(0, 256), 0);
        // 2048 texels × 4 bytes is already aligned.
        assert_eq!(align_to(2048 * 4, 256), 8192);
    }

    #[test]
    fn test_pack_rows_strips_stride_padding() {
        let img = Image::<u8>::from_vec_with_stride(3, 2, 4, vec![10, 20, 30, 99, 40, 50, 60, 99]);
        let staging = pack_rows(img.as_slice(), img.stride(), 3, 2, 256);
        assert_eq!(staging.len(), 512);
        assert_eq!(&staging[0..3], &[10, 20, 30]);
        assert_eq!(&staging[256..259], &[40, 50, 60]);
        assert!(staging[3..256].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pack_rows_rgba_texels() {
        let img = RgbaImage::from_vec(2, 1, vec![[1, 2, 3, 4], [5, 6, 7, 8]]);
        let staging = pack_rows(img.as_slice(), img.stride(), 2, 1, 256);
        assert_eq!(&staging[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    // ---- GPU round-trip tests (subprocess-isolated, see gpu::device) -------

    fn run_gpu_test_in_subprocess(test_name: &str) -> String {
        let output = std::process::Command::new("cargo")
            .args([
                "test", "--lib", "--",
                test_name, "--exact", "--ignored", "--nocapture",
            ])
            .output()
            .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        print!("{stdout}");
        eprint!("{stderr}");
        stdout + &stderr
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_seed_writes_both_textures() {
        let gpu = GpuDevice::new().expect("need a GPU");
        let pair = SimulationPair::new(&gpu, 64, 32);
        let seed = RgbaImage::from_fn(64, 32, |x, y| [x as u8, y as u8, (x ^ y) as u8, 255]);

        let mut encoder = gpu.device.create_command_encoder(&Default::default());
        pair.record_seed(&gpu, &mut encoder, &seed);
        gpu.queue.submit(std::iter::once(encoder.finish()));

        assert_eq!(pair.get(BufferIndex::A).readback(&gpu).unwrap(), seed);
        assert_eq!(pair.get(BufferIndex::B).readback(&gpu).unwrap(), seed);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_field_round_trip_with_padding() {
        let gpu = GpuDevice::new().expect("need a GPU");
        let src = Image::<u8>::from_vec_with_stride(3, 2, 5, vec![10, 20, 30, 0, 0, 40, 50, 60, 0, 0]);
        let field = FieldTexture::new(&gpu, 3, 2);
        field.write(&gpu, &src);
        let back = field.readback(&gpu).unwrap();
        assert_eq!(back.as_slice(), &[10, 20, 30, 40, 50, 60]);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_seed_writes_both_textures() {
        let out = run_gpu_test_in_subprocess("gpu::texture::tests::inner_seed_writes_both_textures");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_field_round_trip_with_padding() {
        let out = run_gpu_test_in_subprocess("gpu::texture::tests::inner_field_round_trip_with_padding");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
