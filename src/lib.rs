// rdcam: camera-modulated reaction-diffusion on the GPU.
//
// A reaction-diffusion system runs on a pair of ping-pong textures; a
// camera's luminance plane scales one reaction constant per texel, and
// each displayed frame is a Gaussian-blurred view of the newest state.
//
// CPU reference implementation alongside the wgpu pipeline in `gpu`.

pub mod image;
pub mod convolution;
pub mod params;
pub mod config;
pub mod pingpong;
pub mod seed;
pub mod field;
pub mod reference;
pub mod backend;
pub mod driver;

pub mod gpu;
