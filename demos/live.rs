// demos/live.rs
//
// Live camera-modulated reaction-diffusion in a minifb window.
//
// A capture thread plays the camera: it publishes a luminance plane into
// the field channel at its own rate, either a moving synthetic pattern or
// the images of a directory in a loop. The main thread runs the frame
// driver once per window refresh and shows the presented frame.
//
// Usage:
//   cargo run --example live --release
//   cargo run --example live --release -- --model gray-scott --dispatches 16
//   cargo run --example live --release -- --camera-dir frames/ --seed-image seed.png
//   cargo run --example live --release -- --cpu --grid 256x192 --viewport 512x384
//
// Controls:
//   Space  — pause/resume the simulation
//   R      — reseed
//   Q/Esc  — quit
//
// Logging: RUST_LOG=rdcam=debug for per-frame skip reasons.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use rdcam::backend::{Backend, CpuBackend};
use rdcam::config::SimulationConfig;
use rdcam::driver::{FrameDriver, FrameOutcome};
use rdcam::field::{self, FieldPublisher};
use rdcam::gpu::backend::GpuBackend;
use rdcam::gpu::device::GpuDevice;
use rdcam::gpu::surface::OffscreenSurface;
use rdcam::image::{Image, RgbaImage};
use rdcam::params::ReactionModel;
use rdcam::seed::{ImageSeed, NoiseSeed, SeedSource};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Model {
    FitzhughNagumo,
    GrayScott,
    BelousovZhabotinsky,
}

impl From<Model> for ReactionModel {
    fn from(m: Model) -> Self {
        match m {
            Model::FitzhughNagumo => ReactionModel::FitzhughNagumo,
            Model::GrayScott => ReactionModel::GrayScott,
            Model::BelousovZhabotinsky => ReactionModel::BelousovZhabotinsky,
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Camera-modulated reaction-diffusion, live")]
struct Args {
    /// Reaction model.
    #[arg(long, value_enum, default_value = "fitzhugh-nagumo")]
    model: Model,

    /// Simulation grid, WxH. Both must be multiples of 16.
    #[arg(long, value_parser = parse_size, default_value = "1024x768")]
    grid: (u32, u32),

    /// Window size, WxH.
    #[arg(long, value_parser = parse_size, default_value = "1024x768")]
    viewport: (u32, u32),

    /// Kernel dispatches per displayed frame.
    #[arg(long, default_value_t = rdcam::config::DISPATCHES_PER_FRAME)]
    dispatches: u32,

    /// Display blur sigma in grid texels.
    #[arg(long, default_value_t = rdcam::config::BLUR_SIGMA)]
    sigma: f32,

    /// Seed from an image instead of noise.
    #[arg(long)]
    seed_image: Option<PathBuf>,

    /// Loop the PNG/JPEG frames of this directory as the camera.
    #[arg(long)]
    camera_dir: Option<PathBuf>,

    /// Camera frames per second.
    #[arg(long, default_value_t = 30.0)]
    camera_fps: f32,

    /// Run the CPU reference backend instead of the GPU.
    #[arg(long)]
    cpu: bool,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s.split_once(['x', 'X']).ok_or_else(|| format!("expected WxH, got {s:?}"))?;
    let w = w.parse().map_err(|e| format!("width: {e}"))?;
    let h = h.parse().map_err(|e| format!("height: {e}"))?;
    Ok((w, h))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = SimulationConfig {
        grid_width: args.grid.0,
        grid_height: args.grid.1,
        viewport_width: args.viewport.0,
        viewport_height: args.viewport.1,
        dispatches_per_frame: args.dispatches,
        blur_sigma: args.sigma,
        model: args.model.into(),
        ..Default::default()
    };
    config.validate().context("invalid simulation config")?;

    let seed: Box<dyn SeedSource> = match &args.seed_image {
        Some(path) => Box::new(ImageSeed::from_path(path)),
        None => Box::new(NoiseSeed::default()),
    };

    let (camera, fields) = field::channel();
    let capture = spawn_capture(camera, args.camera_dir.clone(), args.camera_fps)?;

    let mut window = Window::new(
        &format!("rdcam — {}", config.model),
        config.viewport_width as usize,
        config.viewport_height as usize,
        WindowOptions { resize: false, ..WindowOptions::default() },
    )
    .context("failed to open window")?;
    window.set_target_fps(60);

    if args.cpu {
        let backend = CpuBackend::new(&config)?;
        let driver = FrameDriver::new(config, backend, BoxedSeed(seed), fields)?;
        run(driver, &mut window, |d| Ok(d.backend().display().cloned()))?;
    } else {
        let gpu = Arc::new(GpuDevice::new().context("no GPU adapter")?);
        log::info!("GPU: {}", gpu.adapter_info);
        let surface = OffscreenSurface::new(&gpu, config.viewport_width, config.viewport_height);
        let backend = GpuBackend::new(Arc::clone(&gpu), &config, surface)?;
        let driver = FrameDriver::new(config, backend, BoxedSeed(seed), fields)?;
        run(driver, &mut window, |d| Ok(Some(d.backend().surface().readback(d.backend().gpu())?)))?;
    }

    // Dropping the receiver makes the next publish fail, which ends capture.
    capture.join().map_err(|_| anyhow::anyhow!("capture thread panicked"))?;
    Ok(())
}

/// Adapter so a runtime-chosen seed can be handed to the driver.
struct BoxedSeed(Box<dyn SeedSource>);

impl SeedSource for BoxedSeed {
    fn produce(&self, width: u32, height: u32) -> Result<RgbaImage, rdcam::seed::SeedError> {
        self.0.produce(width, height)
    }
}

// ============================================================
// Display loop
// ============================================================

fn run<B: Backend>(
    mut driver: FrameDriver<B>,
    window: &mut Window,
    fetch: impl Fn(&FrameDriver<B>) -> Result<Option<RgbaImage>>,
) -> Result<()> {
    let (w, h) = (driver.config().viewport_width as usize, driver.config().viewport_height as usize);
    let mut fb = vec![0u32; w * h];
    let mut paused = false;
    let mut last_report = Instant::now();

    while window.is_open() && !window.is_key_down(Key::Escape) && !window.is_key_down(Key::Q) {
        if window.is_key_pressed(Key::Space, KeyRepeat::No) {
            paused = !paused;
            log::info!("{}", if paused { "paused" } else { "resumed" });
        }
        if window.is_key_pressed(Key::R, KeyRepeat::No) {
            driver.force_reseed();
        }

        if !paused {
            if let FrameOutcome::Presented { .. } = driver.draw_frame()? {
                if let Some(frame) = fetch(&driver)? {
                    blit(&frame, &mut fb, w, h);
                }
            }
        }
        window.update_with_buffer(&fb, w, h)?;

        if last_report.elapsed() >= Duration::from_secs(2) {
            log::info!("{}", driver.stats());
            last_report = Instant::now();
        }
    }
    Ok(())
}

/// Copy an RGBA frame into minifb's 0RGB buffer, scaling nearest-neighbour.
fn blit(frame: &RgbaImage, fb: &mut [u32], w: usize, h: usize) {
    let frame = if (frame.width(), frame.height()) == (w, h) {
        frame.clone()
    } else {
        frame.resize_nearest(w, h)
    };
    for (x, y, [r, g, b, _]) in frame.pixels() {
        fb[y * w + x] = (r as u32) << 16 | (g as u32) << 8 | b as u32;
    }
}

// ============================================================
// Capture thread
// ============================================================

fn spawn_capture(
    camera: FieldPublisher,
    dir: Option<PathBuf>,
    fps: f32,
) -> Result<thread::JoinHandle<()>> {
    let frames = match dir {
        Some(dir) => load_frames(&dir)?,
        None => Vec::new(),
    };
    let period = Duration::from_secs_f32(1.0 / fps.max(1.0));

    Ok(thread::spawn(move || {
        let start = Instant::now();
        let mut i = 0usize;
        loop {
            let luma = if frames.is_empty() {
                synthetic_frame(640, 480, start.elapsed().as_secs_f32())
            } else {
                Arc::clone(&frames[i % frames.len()])
            };
            if !camera.publish_shared(luma) {
                log::debug!("field receiver gone, capture stopping");
                return;
            }
            i += 1;
            thread::sleep(period);
        }
    }))
}

fn load_frames(dir: &Path) -> Result<Vec<Arc<Image<u8>>>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
                Some("png" | "jpg" | "jpeg")
            )
        })
        .collect();
    paths.sort();
    if paths.is_empty() {
        bail!("no PNG/JPEG frames in {}", dir.display());
    }

    let mut frames = Vec::with_capacity(paths.len());
    for path in &paths {
        let luma = image::open(path).with_context(|| format!("decoding {}", path.display()))?.to_luma8();
        let (w, h) = luma.dimensions();
        frames.push(Arc::new(Image::from_vec(w as usize, h as usize, luma.into_raw())));
    }
    log::info!("camera: {} frames from {}", frames.len(), dir.display());
    Ok(frames)
}

/// A drifting bright disc over a slow horizontal gradient.
fn synthetic_frame(w: usize, h: usize, t: f32) -> Arc<Image<u8>> {
    let cx = w as f32 * (0.5 + 0.3 * (t * 0.4).cos());
    let cy = h as f32 * (0.5 + 0.3 * (t * 0.7).sin());
    let r2 = (h as f32 * 0.2).powi(2);
    Arc::new(Image::from_fn(w, h, |x, y| {
        let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
        if d2 < r2 {
            230
        } else {
            (40.0 + 120.0 * x as f32 / w as f32) as u8
        }
    }))
}
