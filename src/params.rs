// params.rs — Reaction-diffusion constants and model selection.
//
// `ReactionDiffusionParameters` is uploaded verbatim into a uniform buffer,
// so its layout must match `ReactionDiffusionParameters` in
// `shaders/reaction_diffusion.wgsl` exactly:
//
//   offset  0: timestep   offset 32: f       offset 48: alpha
//   offset  4: a0         offset 36: k       offset 52: beta
//   offset  8: a1         offset 40: du      offset 56: gamma
//   offset 12: epsilon    offset 44: dv      offset 60: _pad
//   offset 16: delta
//   offset 20: k1
//   offset 24: k2
//   offset 28: k3
//   total: 64 bytes (uniform structs round up to 16)
//
// Every model reads the whole record; which fields it consumes depends on
// the `ReactionModel` chosen at startup.

use std::fmt;

/// Simulation constants, all f32, in upload order.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ReactionDiffusionParameters {
    // Fitzhugh-Nagumo
    pub timestep: f32,
    pub a0: f32,
    pub a1: f32,
    pub epsilon: f32,
    pub delta: f32,
    pub k1: f32,
    pub k2: f32,
    pub k3: f32,

    // Gray-Scott
    pub f: f32,
    pub k: f32,
    pub du: f32,
    pub dv: f32,

    // Belousov-Zhabotinsky
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,

    _pad: f32,
}

impl Default for ReactionDiffusionParameters {
    fn default() -> Self {
        ReactionDiffusionParameters {
            timestep: 0.1,
            a0: 0.2199,
            a1: 0.7,
            epsilon: 0.6387,
            delta: 2.54,
            k1: 2.055,
            k2: 2.0092,
            k3: 0.5563,

            f: 0.033945,
            k: 0.067461,
            du: 0.144531,
            dv: 0.046387,

            alpha: 1.0,
            beta: 1.0,
            gamma: 1.0,

            _pad: 0.0,
        }
    }
}

impl ReactionDiffusionParameters {
    /// Size of the uploaded record in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Raw bytes for buffer upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Which reaction kernel runs. Fixed for the lifetime of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReactionModel {
    /// Activator u in R, inhibitor v in G.
    #[default]
    FitzhughNagumo,
    /// Substrate u in R, catalyst v in G.
    GrayScott,
    /// Three species a, b, c in R, G, B.
    BelousovZhabotinsky,
}

impl ReactionModel {
    /// WGSL entry point implementing this model.
    pub fn entry_point(self) -> &'static str {
        match self {
            ReactionModel::FitzhughNagumo => "fitzhugh_nagumo",
            ReactionModel::GrayScott => "gray_scott",
            ReactionModel::BelousovZhabotinsky => "belousov_zhabotinsky",
        }
    }
}

impl fmt::Display for ReactionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactionModel::FitzhughNagumo => write!(f, "Fitzhugh-Nagumo"),
            ReactionModel::GrayScott => write!(f, "Gray-Scott"),
            ReactionModel::BelousovZhabotinsky => write!(f, "Belousov-Zhabotinsky"),
        }
    }
}
