// config.rs — Simulation configuration and startup validation.
//
// Grid size, thread-group size, dispatch count and blur width are all
// tuning knobs; each is a named constant feeding
// `SimulationConfig::default()` and can be overridden per run.

use crate::convolution::{half_size_for_sigma, MAX_HALF_SIZE};
use crate::params::{ReactionDiffusionParameters, ReactionModel};

/// Simulation grid width in texels.
pub const GRID_WIDTH: u32 = 2048;
/// Simulation grid height in texels.
pub const GRID_HEIGHT: u32 = 1536;
/// Compute thread-group width.
pub const THREADGROUP_WIDTH: u32 = 16;
/// Compute thread-group height.
pub const THREADGROUP_HEIGHT: u32 = 16;
/// Kernel dispatches per displayed frame.
pub const DISPATCHES_PER_FRAME: u32 = 9;
/// Gaussian sigma of the display blur, in grid texels.
pub const BLUR_SIGMA: f32 = 3.0;
/// Logical presentation viewport.
pub const VIEWPORT_WIDTH: u32 = 1024;
pub const VIEWPORT_HEIGHT: u32 = 768;

/// Thread-group (workgroup) dimensions for the compute kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Total invocations per workgroup.
    pub fn total(&self) -> u32 {
        self.x * self.y
    }
}

impl Default for WorkgroupSize {
    fn default() -> Self {
        WorkgroupSize { x: THREADGROUP_WIDTH, y: THREADGROUP_HEIGHT }
    }
}

impl std::fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Everything fixed for the lifetime of one simulation.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub grid_width: u32,
    pub grid_height: u32,
    pub workgroup: WorkgroupSize,
    pub dispatches_per_frame: u32,
    pub blur_sigma: f32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub model: ReactionModel,
    /// Constants re-uploaded every frame.
    pub parameters: ReactionDiffusionParameters,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            grid_width: GRID_WIDTH,
            grid_height: GRID_HEIGHT,
            workgroup: WorkgroupSize::default(),
            dispatches_per_frame: DISPATCHES_PER_FRAME,
            blur_sigma: BLUR_SIGMA,
            viewport_width: VIEWPORT_WIDTH,
            viewport_height: VIEWPORT_HEIGHT,
            model: ReactionModel::default(),
            parameters: ReactionDiffusionParameters::default(),
        }
    }
}

impl SimulationConfig {
    /// Check every startup invariant.
    ///
    /// The grid must be an exact multiple of the workgroup in both
    /// dimensions: dispatches cover W×H with no partial groups, and a
    /// mismatch is rejected here rather than truncated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(ConfigError::EmptyGrid);
        }
        if self.workgroup.x == 0 || self.workgroup.y == 0 {
            return Err(ConfigError::EmptyWorkgroup);
        }
        if self.grid_width % self.workgroup.x != 0 {
            return Err(ConfigError::GridNotDivisible {
                axis: "width",
                grid: self.grid_width,
                group: self.workgroup.x,
            });
        }
        if self.grid_height % self.workgroup.y != 0 {
            return Err(ConfigError::GridNotDivisible {
                axis: "height",
                grid: self.grid_height,
                group: self.workgroup.y,
            });
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(ConfigError::EmptyViewport);
        }
        if !(self.blur_sigma > 0.0) || half_size_for_sigma(self.blur_sigma) > MAX_HALF_SIZE {
            return Err(ConfigError::BlurSigma(self.blur_sigma));
        }
        if self.dispatches_per_frame == 0 {
            log::warn!("dispatches_per_frame is 0: frames will only blur and present");
        }
        Ok(())
    }

    /// Number of workgroups per dispatch, `(W / wg.x, H / wg.y)`.
    ///
    /// Exact division; only meaningful after `validate()` succeeded.
    pub fn dispatch_size(&self) -> (u32, u32) {
        (self.grid_width / self.workgroup.x, self.grid_height / self.workgroup.y)
    }
}

/// Configuration rejected at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("grid dimensions must be non-zero")]
    EmptyGrid,
    #[error("workgroup dimensions must be non-zero")]
    EmptyWorkgroup,
    #[error("grid {axis} {grid} is not a multiple of the workgroup {axis} {group}")]
    GridNotDivisible { axis: &'static str, grid: u32, group: u32 },
    #[error("viewport dimensions must be non-zero")]
    EmptyViewport,
    #[error("blur sigma {0} is outside (0, 5]")]
    BlurSigma(f32),
    #[error("workgroup of {total} invocations exceeds the device limit of {max}")]
    WorkgroupTooLarge { total: u32, max: u32 },
    #[error("grid {width}×{height} exceeds the device texture limit of {max}")]
    GridTooLarge { width: u32, height: u32, max: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SimulationConfig::default();
        assert_eq!(config.validate(), Ok(()));
        // 2048/16 = 128, 1536/16 = 96
        assert_eq!(config.dispatch_size(), (128, 96));
    }

    #[test]
    fn test_non_multiple_width_rejected() {
        let config = SimulationConfig { grid_width: 2050, ..Default::default() };
        assert_eq!(
            config.validate(),
            Err(ConfigError::GridNotDivisible { axis: "width", grid: 2050, group: 16 })
        );
    }

    #[test]
    fn test_non_multiple_height_rejected() {
        let config = SimulationConfig {
            grid_height: 100,
            workgroup: WorkgroupSize { x: 8, y: 8 },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::GridNotDivisible { axis: "height", .. })
        ));
    }

    #[test]
    fn test_blur_sigma_bounds() {
        let too_wide = SimulationConfig { blur_sigma: 6.0, ..Default::default() };
        assert_eq!(too_wide.validate(), Err(ConfigError::BlurSigma(6.0)));
        let negative = SimulationConfig { blur_sigma: -1.0, ..Default::default() };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let grid = SimulationConfig { grid_width: 0, ..Default::default() };
        assert_eq!(grid.validate(), Err(ConfigError::EmptyGrid));
        let wg = SimulationConfig { workgroup: WorkgroupSize { x: 0, y: 16 }, ..Default::default() };
        assert_eq!(wg.validate(), Err(ConfigError::EmptyWorkgroup));
        let vp = SimulationConfig { viewport_height: 0, ..Default::default() };
        assert_eq!(vp.validate(), Err(ConfigError::EmptyViewport));
    }
}
