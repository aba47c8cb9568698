// backend.rs — The seam between the frame driver and whatever executes it.
//
// `FrameDriver` owns the per-frame policy (preconditions, lazy seeding,
// dispatch count, ping-pong toggling); a `Backend` owns the resources and
// records the work. Two implementations exist:
//
//   GpuBackend   (gpu/backend.rs)  wgpu textures, compute + render passes
//   CpuBackend   (this file)       reference kernels on `RgbaImage`s
//
// The CPU backend exists so the whole driver can be exercised without an
// adapter, and so GPU output has something to be compared against. It
// counts every call that would be GPU work on a real device.
//
// CALL ORDER PER PRESENTED FRAME
// ──────────────────────────────
//   is_ready → acquire_target → begin_frame → [seed] → [upload_field]
//   → upload_params → dispatch × N → blur → submit
//
// A skipped frame stops after the first failing check and makes none of
// the calls from `begin_frame` on.

use crate::config::{ConfigError, SimulationConfig};
use crate::convolution::gaussian_blur_rgba;
use crate::field::ParameterField;
use crate::image::RgbaImage;
use crate::params::{ReactionDiffusionParameters, ReactionModel};
use crate::pingpong::{BufferIndex, PingPong};
use crate::reference;

/// Executes the work the frame driver schedules.
pub trait Backend {
    /// Presentation target for one frame (a surface texture, a CPU buffer).
    type Target;

    /// Device (or equivalent) usable for work this frame.
    fn is_ready(&self) -> bool;

    /// Simulation grid size `(W, H)`.
    fn grid_size(&self) -> (u32, u32);

    /// Acquire this frame's display target; `None` means not available now.
    fn acquire_target(&mut self) -> Option<Self::Target>;

    /// Start recording a frame.
    fn begin_frame(&mut self);

    /// Write identical seed bytes into both simulation buffers.
    fn seed(&mut self, seed: &RgbaImage);

    /// Replace the parameter field.
    fn upload_field(&mut self, field: &ParameterField);

    /// Upload the constants every following dispatch reads.
    fn upload_params(&mut self, params: &ReactionDiffusionParameters);

    /// Record one kernel dispatch reading `input` and writing `input.next()`.
    fn dispatch(&mut self, input: BufferIndex);

    /// Record the display blur from simulation buffer `source` into `target`.
    fn blur(&mut self, source: BufferIndex, target: &mut Self::Target);

    /// Submit the recorded frame and present `target`. Never blocks on the GPU.
    fn submit(&mut self, target: Self::Target);
}

// ---------------------------------------------------------------------------
// CpuBackend
// ---------------------------------------------------------------------------

/// Per-call counters. Every field counts something that is GPU work on a
/// real device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCounters {
    pub frames_begun:   u64,
    pub seeds:          u64,
    pub field_uploads:  u64,
    pub param_uploads:  u64,
    pub dispatches:     u64,
    pub blurs:          u64,
    pub submits:        u64,
}

impl BackendCounters {
    /// `true` if nothing was ever recorded.
    pub fn is_idle(&self) -> bool {
        *self == BackendCounters::default()
    }
}

/// Reference backend running the kernels on the CPU.
///
/// Readiness and surface availability are switches so tests can force
/// each skip path.
pub struct CpuBackend {
    model:       ReactionModel,
    grid:        (u32, u32),
    viewport:    (u32, u32),
    blur_sigma:  f32,

    buffers:     PingPong<RgbaImage>,
    field:       Option<ParameterField>,
    params:      ReactionDiffusionParameters,
    display:     Option<RgbaImage>,

    ready:            bool,
    surface_attached: bool,
    counters:         BackendCounters,
}

impl CpuBackend {
    /// Allocate both simulation buffers (zeroed) for `config`.
    pub fn new(config: &SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (w, h) = (config.grid_width as usize, config.grid_height as usize);
        Ok(CpuBackend {
            model:      config.model,
            grid:       (config.grid_width, config.grid_height),
            viewport:   (config.viewport_width, config.viewport_height),
            blur_sigma: config.blur_sigma,
            buffers:    PingPong::new(RgbaImage::new(w, h), RgbaImage::new(w, h)),
            field:      None,
            params:     config.parameters,
            display:    None,
            ready:            true,
            surface_attached: true,
            counters:         BackendCounters::default(),
        })
    }

    /// Simulate device availability.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Simulate a display surface appearing or going away.
    pub fn set_surface_attached(&mut self, attached: bool) {
        self.surface_attached = attached;
    }

    /// Contents of one simulation buffer.
    pub fn buffer(&self, index: BufferIndex) -> &RgbaImage {
        self.buffers.get(index)
    }

    /// Last presented frame, viewport-sized.
    pub fn display(&self) -> Option<&RgbaImage> {
        self.display.as_ref()
    }

    /// Field most recently uploaded.
    pub fn field(&self) -> Option<&ParameterField> {
        self.field.as_ref()
    }

    pub fn counters(&self) -> BackendCounters {
        self.counters
    }
}

impl Backend for CpuBackend {
    type Target = RgbaImage;

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn grid_size(&self) -> (u32, u32) {
        self.grid
    }

    fn acquire_target(&mut self) -> Option<RgbaImage> {
        self.surface_attached
            .then(|| RgbaImage::new(self.viewport.0 as usize, self.viewport.1 as usize))
    }

    fn begin_frame(&mut self) {
        self.counters.frames_begun += 1;
    }

    fn seed(&mut self, seed: &RgbaImage) {
        let compact = seed.to_compact();
        *self.buffers.get_mut(BufferIndex::A) = compact.clone();
        *self.buffers.get_mut(BufferIndex::B) = compact;
        self.counters.seeds += 1;
    }

    fn upload_field(&mut self, field: &ParameterField) {
        self.field = Some(field.clone());
        self.counters.field_uploads += 1;
    }

    fn upload_params(&mut self, params: &ReactionDiffusionParameters) {
        self.params = *params;
        self.counters.param_uploads += 1;
    }

    fn dispatch(&mut self, input: BufferIndex) {
        let Some(field) = self.field.as_ref() else {
            log::warn!("dispatch recorded before any parameter field was uploaded");
            return;
        };
        let (read, write) = self.buffers.split(input);
        reference::step(self.model, read, write, field, &self.params);
        self.counters.dispatches += 1;
    }

    fn blur(&mut self, source: BufferIndex, target: &mut RgbaImage) {
        let blurred = gaussian_blur_rgba(self.buffers.get(source), self.blur_sigma);
        *target = blurred.resize_nearest(target.width(), target.height());
        self.counters.blurs += 1;
    }

    fn submit(&mut self, target: RgbaImage) {
        self.display = Some(target);
        self.counters.submits += 1;
    }
}
