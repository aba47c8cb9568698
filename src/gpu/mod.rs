// gpu/mod.rs — wgpu implementation of the simulation.
//
// Every kernel here has a CPU counterpart in the parent crate that remains
// the authoritative reference:
//
//   gpu::kernel   ↔  reference::step
//   gpu::blur     ↔  convolution::gaussian_blur_rgba
//   gpu::backend  ↔  backend::CpuBackend
//
// Per frame the GPU does all the work; the CPU only records commands.
// The one synchronous path is readback, which tests, demos and benches use.

pub mod backend;
pub mod blur;
pub mod device;
pub mod kernel;
pub mod surface;
pub mod texture;
