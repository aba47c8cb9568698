// driver.rs — Per-frame orchestration.
//
// `FrameDriver::draw_frame()` is called once per display refresh. It
// never blocks, and it does either all of a frame's work or none of it:
//
//   0. take the newest camera field, if one arrived (else keep the last)
//   1. preconditions: device ready, field present, display target
//      acquirable; any miss → Skipped, zero GPU work, retry next tick
//   2. seed both simulation buffers, first presented frame only
//   3. upload the field (when new) and the parameter record (always)
//   4. N dispatches, toggling the active buffer after each
//   5. blur the active buffer (the newest output) into the target
//   6. submit and present
//
// After K dispatches the active index equals its initial value XOR (K odd).
// Reseeding does not touch the active index: both buffers hold the same
// bytes afterwards, so either one is a valid read source.

use std::time::{Duration, Instant};

use crate::backend::Backend;
use crate::config::{ConfigError, SimulationConfig};
use crate::field::{FieldReceiver, ParameterField};
use crate::pingpong::BufferIndex;
use crate::seed::{SeedError, SeedSource};

// ---------------------------------------------------------------------------
// Outcomes and errors
// ---------------------------------------------------------------------------

/// Whether the simulation buffers still need their initial contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedState {
    #[default]
    Uninitialized,
    Seeded,
}

/// Why a frame did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Device lost or not yet created.
    DeviceNotReady,
    /// No camera frame has been delivered yet.
    NoParameterField,
    /// The display surface has no target to give right now.
    NoSurface,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DeviceNotReady   => write!(f, "device not ready"),
            SkipReason::NoParameterField => write!(f, "no parameter field yet"),
            SkipReason::NoSurface        => write!(f, "no display target"),
        }
    }
}

/// Result of one `draw_frame()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was recorded and submitted.
    Presented {
        /// Kernel dispatches recorded this frame.
        dispatches: u32,
        /// Buffer that was blurred (holds the newest state).
        active: BufferIndex,
    },
    Skipped(SkipReason),
}

impl FrameOutcome {
    pub fn is_presented(&self) -> bool {
        matches!(self, FrameOutcome::Presented { .. })
    }
}

/// Fatal per-frame failure. The simulation cannot continue.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("seeding failed: {0}")]
    Seed(#[from] SeedError),
    #[error("seed source returned {got_width}×{got_height} for a {width}×{height} grid")]
    SeedDimensions { width: u32, height: u32, got_width: u32, got_height: u32 },
}

/// Running totals across the driver's lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverStats {
    pub frames_presented: u64,
    pub frames_skipped:   u64,
    pub dispatches:       u64,
    /// Wall time spent recording the last presented frame (excludes GPU time).
    pub last_encode:      Duration,
}

impl std::fmt::Display for DriverStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "presented {} | skipped {} | dispatches {} | encode {:.2}ms",
            self.frames_presented,
            self.frames_skipped,
            self.dispatches,
            self.last_encode.as_secs_f64() * 1000.0,
        )
    }
}

// ---------------------------------------------------------------------------
// FrameDriver
// ---------------------------------------------------------------------------

/// Drives a `Backend` one display frame at a time.
///
/// # Example
/// ```
/// use rdcam::backend::CpuBackend;
/// use rdcam::config::{SimulationConfig, WorkgroupSize};
/// use rdcam::driver::{FrameDriver, FrameOutcome, SkipReason};
/// use rdcam::field;
/// use rdcam::image::Image;
/// use rdcam::seed::NoiseSeed;
///
/// let config = SimulationConfig {
///     grid_width: 32,
///     grid_height: 32,
///     workgroup: WorkgroupSize { x: 8, y: 8 },
///     viewport_width: 32,
///     viewport_height: 32,
///     ..Default::default()
/// };
/// let backend = CpuBackend::new(&config).unwrap();
/// let (camera, receiver) = field::channel();
/// let mut driver = FrameDriver::new(config, backend, NoiseSeed::default(), receiver).unwrap();
///
/// // Nothing to modulate with yet.
/// assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Skipped(SkipReason::NoParameterField));
///
/// camera.publish(Image::filled(16, 16, 128u8));
/// assert!(driver.draw_frame().unwrap().is_presented());
/// ```
pub struct FrameDriver<B: Backend> {
    config:  SimulationConfig,
    backend: B,
    seed:    Box<dyn SeedSource>,
    fields:  FieldReceiver,

    field:       Option<ParameterField>,
    field_dirty: bool,
    seed_state:  SeedState,
    active:      BufferIndex,
    stats:       DriverStats,
}

impl<B: Backend> FrameDriver<B> {
    /// Validate `config` and take ownership of the backend.
    pub fn new(
        config:  SimulationConfig,
        backend: B,
        seed:    impl SeedSource + 'static,
        fields:  FieldReceiver,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        log::info!(
            "frame driver: {} on {}×{}, {} dispatches/frame, workgroup {}",
            config.model,
            config.grid_width,
            config.grid_height,
            config.dispatches_per_frame,
            config.workgroup,
        );
        Ok(FrameDriver {
            config,
            backend,
            seed: Box::new(seed),
            fields,
            field:       None,
            field_dirty: false,
            seed_state:  SeedState::Uninitialized,
            active:      BufferIndex::A,
            stats:       DriverStats::default(),
        })
    }

    /// Record, submit and present one frame, or skip it.
    pub fn draw_frame(&mut self) -> Result<FrameOutcome, FrameError> {
        // ── Step 0: Latest camera field ─────────────────────────────────────
        if let Some(field) = self.fields.take_latest() {
            if field.width() == 0 || field.height() == 0 {
                log::warn!(
                    "ignoring empty {}×{} parameter field",
                    field.width(),
                    field.height()
                );
            } else {
                self.field = Some(field);
                self.field_dirty = true;
            }
        }

        // ── Step 1: Preconditions ───────────────────────────────────────────
        if !self.backend.is_ready() {
            return Ok(self.skip(SkipReason::DeviceNotReady));
        }
        let Some(field) = self.field.clone() else {
            return Ok(self.skip(SkipReason::NoParameterField));
        };
        let Some(mut target) = self.backend.acquire_target() else {
            return Ok(self.skip(SkipReason::NoSurface));
        };

        let t0 = Instant::now();

        // ── Step 2: Seed on the first frame ─────────────────────────────────
        // Produced before any recording so a failed seed leaves nothing
        // half-encoded.
        let seed = match self.seed_state {
            SeedState::Uninitialized => {
                let (width, height) = self.backend.grid_size();
                let seed = self.seed.produce(width, height)?;
                let (got_width, got_height) = seed.dimensions();
                if (got_width, got_height) != (width, height) {
                    return Err(FrameError::SeedDimensions { width, height, got_width, got_height });
                }
                Some(seed)
            }
            SeedState::Seeded => None,
        };

        self.backend.begin_frame();
        if let Some(seed) = seed {
            self.backend.seed(&seed);
            self.seed_state = SeedState::Seeded;
            log::info!("simulation seeded ({}×{})", seed.width(), seed.height());
        }

        // ── Step 3: Uploads ─────────────────────────────────────────────────
        if self.field_dirty {
            self.backend.upload_field(&field);
            self.field_dirty = false;
        }
        self.backend.upload_params(&self.config.parameters);

        // ── Step 4: Dispatch loop ───────────────────────────────────────────
        let dispatches = self.config.dispatches_per_frame;
        for _ in 0..dispatches {
            self.backend.dispatch(self.active);
            self.active = self.active.next();
        }

        // ── Step 5: Blur the newest state ───────────────────────────────────
        self.backend.blur(self.active, &mut target);

        // ── Step 6: Submit + present ────────────────────────────────────────
        self.backend.submit(target);

        self.stats.frames_presented += 1;
        self.stats.dispatches += dispatches as u64;
        self.stats.last_encode = t0.elapsed();

        Ok(FrameOutcome::Presented { dispatches, active: self.active })
    }

    /// Seed again on the next presented frame.
    pub fn force_reseed(&mut self) {
        self.seed_state = SeedState::Uninitialized;
    }

    fn skip(&mut self, reason: SkipReason) -> FrameOutcome {
        log::debug!("frame skipped: {reason}");
        self.stats.frames_skipped += 1;
        FrameOutcome::Skipped(reason)
    }

    /// Buffer holding the newest simulation state.
    pub fn active(&self) -> BufferIndex {
        self.active
    }

    pub fn seed_state(&self) -> SeedState {
        self.seed_state
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Field the next frame would use, if any has arrived.
    pub fn current_field(&self) -> Option<&ParameterField> {
        self.field.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
