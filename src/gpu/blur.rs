// gpu/blur.rs — Two-pass Gaussian blur from a simulation texture into the
// display target.
//
// Mirrors `convolution::gaussian_blur_rgba()` followed by a resample to the
// viewport:
//
//   pass 1  compute  blur_horizontal   simulation[src] → scratch (Rgba16Float, W×H)
//   pass 2  render   blur_vertical_fs  scratch → target view (viewport size)
//
// The scratch is f16 so the horizontal sums are not re-quantised to 8 bits
// between the passes. The blur only ever reads the simulation; nothing it
// writes feeds back into the next frame.

use crate::config::SimulationConfig;
use crate::convolution::{gaussian_kernel_1d, half_size_for_sigma, MAX_HALF_SIZE};
use crate::gpu::device::GpuDevice;
use crate::gpu::texture::SimulationPair;
use crate::pingpong::{BufferIndex, PingPong};

const SCRATCH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

// ---------------------------------------------------------------------------
// Uniform (must match `BlurParams` in blur.wgsl)
// ---------------------------------------------------------------------------

/// Layout:
///   offset  0: half_size  (u32)
///   offset  4: _pad       (3 × u32)
///   offset 16: coeffs     (4 × vec4<f32> = 16 × f32)
///   total:  80 bytes
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurParams {
    half_size: u32,
    _pad:      [u32; 3],
    /// coeffs[i/4][i%4] = weight at offset i, i in 0..=half_size.
    coeffs:    [[f32; 4]; 4],
}

impl BlurParams {
    fn new(sigma: f32) -> Self {
        let half_size = half_size_for_sigma(sigma).min(MAX_HALF_SIZE);
        let kernel = gaussian_kernel_1d(half_size, sigma);
        // Right half of the symmetric kernel: offsets 0, 1, ..., half_size.
        let mut coeffs = [[0.0f32; 4]; 4];
        for (i, &c) in kernel[half_size..].iter().enumerate() {
            coeffs[i / 4][i % 4] = c;
        }
        BlurParams { half_size: half_size as u32, _pad: [0; 3], coeffs }
    }
}

// ---------------------------------------------------------------------------
// GpuBlur
// ---------------------------------------------------------------------------

/// Compiled blur pipelines plus the scratch texture and bind groups.
pub struct GpuBlur {
    horizontal:  wgpu::ComputePipeline,
    vertical:    wgpu::RenderPipeline,
    h_groups:    PingPong<wgpu::BindGroup>,
    v_group:     wgpu::BindGroup,
    dispatch:    (u32, u32),
    _scratch:    wgpu::Texture,
    _params_buf: wgpu::Buffer,
}

impl GpuBlur {
    /// Build both passes for blurring `pair` into targets of `target_format`.
    pub fn new(
        gpu:           &GpuDevice,
        config:        &SimulationConfig,
        pair:          &SimulationPair,
        target_format: wgpu::TextureFormat,
    ) -> Self {
        use wgpu::util::DeviceExt;

        let shader_src = include_str!("../shaders/blur.wgsl")
            .replace("{{WG_X}}", &config.workgroup.x.to_string())
            .replace("{{WG_Y}}", &config.workgroup.y.to_string());
        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blur.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let params = BlurParams::new(config.blur_sigma);
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("BlurParams"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let (width, height) = pair.dimensions();
        let scratch = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("blur scratch"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SCRATCH_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let scratch_view = scratch.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blur scratch sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let params_entry = |visibility| wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        // ── Pass 1: horizontal compute ──────────────────────────────────────
        let h_bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur horizontal BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: SCRATCH_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                params_entry(wgpu::ShaderStages::COMPUTE),
            ],
        });
        let horizontal = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("blur_horizontal"),
            layout: Some(&gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("blur horizontal layout"),
                bind_group_layouts: &[&h_bgl],
                push_constant_ranges: &[],
            })),
            module: &shader,
            entry_point: "blur_horizontal",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let h_group = |source: BufferIndex| {
            gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("blur horizontal"),
                layout: &h_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&pair.get(source).view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&scratch_view),
                    },
                    wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
                ],
            })
        };
        let h_groups = PingPong::new(h_group(BufferIndex::A), h_group(BufferIndex::B));

        // ── Pass 2: vertical fragment into the target ───────────────────────
        let v_bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur vertical BGL"),
            entries: &[
                params_entry(wgpu::ShaderStages::FRAGMENT),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let vertical = gpu.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("blur_vertical"),
            layout: Some(&gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("blur vertical layout"),
                bind_group_layouts: &[&v_bgl],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "fullscreen_vs",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "blur_vertical_fs",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        let v_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blur vertical"),
            layout: &v_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&scratch_view),
                },
                wgpu::BindGroupEntry { binding: 4, resource: wgpu::BindingResource::Sampler(&sampler) },
            ],
        });

        GpuBlur {
            horizontal,
            vertical,
            h_groups,
            v_group,
            dispatch: config.dispatch_size(),
            _scratch: scratch,
            _params_buf: params_buf,
        }
    }

    /// Record both passes, blurring simulation buffer `source` into `target`.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source:  BufferIndex,
        target:  &wgpu::TextureView,
    ) {
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("blur_horizontal"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.horizontal);
            pass.set_bind_group(0, self.h_groups.get(source), &[]);
            pass.dispatch_workgroups(self.dispatch.0, self.dispatch.1, 1);
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blur_vertical"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.vertical);
        pass.set_bind_group(0, &self.v_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
