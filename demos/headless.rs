// demos/headless.rs
//
// Render a fixed number of frames without a window and save the last
// presented frame as a PNG. Useful on CI machines with a software adapter
// and for comparing the GPU pipeline with the CPU reference by eye.
//
// Usage:
//   cargo run --example headless --release -- out.png
//   cargo run --example headless --release -- out.png --frames 300 --model belousov-zhabotinsky
//   cargo run --example headless --release -- cpu.png --cpu --grid 256x192 --viewport 256x192
//
// The field is a fixed synthetic gradient with a bright disc, or the
// luminance of --field-image if given.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{ensure, Context, Result};
use clap::Parser;

use rdcam::backend::{Backend, CpuBackend};
use rdcam::config::SimulationConfig;
use rdcam::driver::FrameDriver;
use rdcam::field;
use rdcam::gpu::backend::GpuBackend;
use rdcam::gpu::device::GpuDevice;
use rdcam::gpu::surface::OffscreenSurface;
use rdcam::image::{Image, RgbaImage};
use rdcam::params::ReactionModel;
use rdcam::seed::NoiseSeed;

#[derive(Debug, Parser)]
#[command(about = "Render reaction-diffusion frames to a PNG")]
struct Args {
    /// Output PNG path.
    output: PathBuf,

    /// Frames to render.
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// fitzhugh-nagumo, gray-scott or belousov-zhabotinsky.
    #[arg(long, default_value = "fitzhugh-nagumo", value_parser = parse_model)]
    model: ReactionModel,

    /// Simulation grid, WxH.
    #[arg(long, value_parser = parse_size, default_value = "1024x768")]
    grid: (u32, u32),

    /// Output size, WxH.
    #[arg(long, value_parser = parse_size, default_value = "1024x768")]
    viewport: (u32, u32),

    #[arg(long, default_value_t = rdcam::config::DISPATCHES_PER_FRAME)]
    dispatches: u32,

    /// Noise seed.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Use this image's luminance as the parameter field.
    #[arg(long)]
    field_image: Option<PathBuf>,

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

fn parse_model(s: &str) -> Result<ReactionModel, String> {
    match s {
        "fitzhugh-nagumo" | "fn" => Ok(ReactionModel::FitzhughNagumo),
        "gray-scott" | "gs" => Ok(ReactionModel::GrayScott),
        "belousov-zhabotinsky" | "bz" => Ok(ReactionModel::BelousovZhabotinsky),
        other => Err(format!("unknown model {other:?}")),
    }
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
        model: args.model,
        ..Default::default()
    };
    config.validate().context("invalid simulation config")?;

    let luma = match &args.field_image {
        Some(path) => {
            let img = image::open(path).with_context(|| format!("decoding {}", path.display()))?.to_luma8();
            let (w, h) = img.dimensions();
            Image::from_vec(w as usize, h as usize, img.into_raw())
        }
        None => synthetic_field(640, 480),
    };
    let luma = Arc::new(luma);
    let seed = NoiseSeed { seed: args.seed, ..NoiseSeed::default() };
    let (camera, fields) = field::channel();
    camera.publish_shared(Arc::clone(&luma));

    let start = Instant::now();
    let frame = if args.cpu {
        let backend = CpuBackend::new(&config)?;
        let mut driver = FrameDriver::new(config, backend, seed, fields)?;
        render(&mut driver, args.frames)?;
        driver.backend().display().cloned().context("nothing was presented")?
    } else {
        let gpu = Arc::new(GpuDevice::new().context("no GPU adapter")?);
        log::info!("GPU: {}", gpu.adapter_info);
        let surface = OffscreenSurface::new(&gpu, config.viewport_width, config.viewport_height);
        let backend = GpuBackend::new(Arc::clone(&gpu), &config, surface)?;
        let mut driver = FrameDriver::new(config, backend, seed, fields)?;
        render(&mut driver, args.frames)?;
        driver.backend().surface().readback(&gpu)?
    };
    log::info!("{} frames in {:.2?}", args.frames, start.elapsed());

    save_png(&frame, &args.output)?;
    println!("wrote {}", args.output.display());
    Ok(())
}

fn render<B: Backend>(driver: &mut FrameDriver<B>, frames: u32) -> Result<()> {
    for _ in 0..frames {
        driver.draw_frame()?;
    }
    let stats = driver.stats();
    ensure!(stats.frames_presented > 0, "every frame was skipped ({stats})");
    log::info!("{stats}");
    Ok(())
}

fn save_png(frame: &RgbaImage, path: &std::path::Path) -> Result<()> {
    let (w, h) = frame.dimensions();
    let buf = image::RgbaImage::from_raw(w, h, frame.to_compact().as_bytes().to_vec())
        .context("frame buffer size mismatch")?;
    buf.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn synthetic_field(w: usize, h: usize) -> Image<u8> {
    let (cx, cy, r) = (w as f32 * 0.6, h as f32 * 0.45, h as f32 * 0.25);
    Image::from_fn(w, h, |x, y| {
        let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        if d < r {
            220
        } else {
            (30.0 + 150.0 * y as f32 / h as f32) as u8
        }
    })
}
