// gpu/surface.rs — Where presented frames go.
//
// `DisplaySurface` is the seam between the GPU backend and the host. The
// crate ships `OffscreenSurface`, a viewport-sized texture the host reads
// back (tests, headless rendering, the minifb demo). A surface with no
// target available returns `None` from `acquire` and the frame is skipped.

use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::texture::read_texture;
use crate::image::RgbaImage;

/// One acquired display target.
pub struct SurfaceTarget {
    /// View the blur's second pass renders into.
    pub view: wgpu::TextureView,
}

/// A presentation destination with a fixed format.
pub trait DisplaySurface {
    /// Colour format of acquired targets.
    fn format(&self) -> wgpu::TextureFormat;

    /// Current size in pixels.
    fn size(&self) -> (u32, u32);

    /// Acquire the next target, or `None` if none is available right now.
    fn acquire(&mut self, gpu: &GpuDevice) -> Option<SurfaceTarget>;

    /// Present `target`. Called after the frame's commands were submitted.
    fn present(&mut self, target: SurfaceTarget);
}

// ---------------------------------------------------------------------------
// OffscreenSurface
// ---------------------------------------------------------------------------

/// Render target texture with synchronous readback.
pub struct OffscreenSurface {
    texture:   wgpu::Texture,
    width:     u32,
    height:    u32,
    attached:  bool,
    presented: u64,
}

impl OffscreenSurface {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new(gpu: &GpuDevice, width: u32, height: u32) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen surface"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        OffscreenSurface { texture, width, height, attached: true, presented: 0 }
    }

    /// Detach/attach, simulating a window that is not yet (or no longer) shown.
    pub fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    /// Frames presented so far.
    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Read the last presented frame. Blocks until the GPU is idle.
    pub fn readback(&self, gpu: &GpuDevice) -> Result<RgbaImage, GpuError> {
        let bytes = read_texture(gpu, &self.texture, self.width, self.height, 4)?;
        RgbaImage::from_rgba_bytes(self.width as usize, self.height as usize, &bytes)
            .ok_or(GpuError::ReadbackAbandoned)
    }
}

impl DisplaySurface for OffscreenSurface {
    fn format(&self) -> wgpu::TextureFormat {
        Self::FORMAT
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn acquire(&mut self, _gpu: &GpuDevice) -> Option<SurfaceTarget> {
        if !self.attached {
            return None;
        }
        let view = self.texture.create_view(&wgpu::TextureViewDescriptor::default());
        Some(SurfaceTarget { view })
    }

    fn present(&mut self, _target: SurfaceTarget) {
        self.presented += 1;
    }
}
