// gpu/kernel.rs — The reaction-diffusion compute pipeline.
//
// Mirrors `reference::step()`. One `ReactionKernel` is built at startup
// for the configured `ReactionModel`; per frame the backend records
// `dispatches_per_frame` passes with it, alternating bind groups.
//
//
// BIND GROUPS
// ────────────
// Binding layout (shaders/reaction_diffusion.wgsl, group 0):
//   0  input    texture_2d<f32>                      simulation[input]
//   1  output   texture_storage_2d<rgba8unorm,write> simulation[input.next()]
//   2  field    texture_2d<f32>                      R8Unorm camera plane
//   3  params   uniform ReactionDiffusionParameters  64 bytes
//
// Only two bind groups are ever needed, A→B and B→A, so both are built
// up front and indexed by the input `BufferIndex`. They reference the
// field texture's view, so they are rebuilt whenever the field texture
// is reallocated.
//
//
// DISPATCH SIZE
// ──────────────
// `SimulationConfig::validate()` guarantees W and H are multiples of the
// workgroup, so (W / wg.x, H / wg.y) covers every texel exactly once.

use crate::config::SimulationConfig;
use crate::gpu::device::GpuDevice;
use crate::gpu::texture::{FieldTexture, SimulationPair, SIMULATION_FORMAT};
use crate::params::{ReactionDiffusionParameters, ReactionModel};
use crate::pingpong::{BufferIndex, PingPong};

/// Compiled kernel + its uniform buffer and ping-pong bind groups.
pub struct ReactionKernel {
    model:       ReactionModel,
    pipeline:    wgpu::ComputePipeline,
    bgl:         wgpu::BindGroupLayout,
    params_buf:  wgpu::Buffer,
    bind_groups: Option<PingPong<wgpu::BindGroup>>,
    dispatch:    (u32, u32),
}

impl ReactionKernel {
    /// Compile the kernel for `config.model`.
    pub fn new(gpu: &GpuDevice, config: &SimulationConfig) -> Self {
        // naga does not accept `override` expressions inside
        // @workgroup_size(), so the dimensions are baked into the source.
        let shader_template = include_str!("../shaders/reaction_diffusion.wgsl");
        let shader_src = shader_template
            .replace("{{WG_X}}", &config.workgroup.x.to_string())
            .replace("{{WG_Y}}", &config.workgroup.y.to_string());

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("reaction_diffusion.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let read_texture = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
            },
            count: None,
        };

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ReactionKernel BGL"),
            entries: &[
                read_texture(0),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: SIMULATION_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                read_texture(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(ReactionDiffusionParameters::SIZE as u64),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ReactionKernel pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(config.model.entry_point()),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: config.model.entry_point(),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let params_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ReactionDiffusionParameters"),
            size: ReactionDiffusionParameters::SIZE as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::debug!(
            "compiled {} kernel, workgroup {}, dispatch {:?}",
            config.model,
            config.workgroup,
            config.dispatch_size(),
        );

        ReactionKernel {
            model: config.model,
            pipeline,
            bgl,
            params_buf,
            bind_groups: None,
            dispatch: config.dispatch_size(),
        }
    }

    /// (Re)build the A→B and B→A bind groups against `field`.
    pub fn bind(&mut self, gpu: &GpuDevice, pair: &SimulationPair, field: &FieldTexture) {
        let make = |input: BufferIndex| {
            let label = match input {
                BufferIndex::A => "reaction A→B",
                BufferIndex::B => "reaction B→A",
            };
            gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&pair.get(input).view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&pair.get(input.next()).view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&field.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: self.params_buf.as_entire_binding(),
                    },
                ],
            })
        };
        self.bind_groups = Some(PingPong::new(make(BufferIndex::A), make(BufferIndex::B)));
    }

    /// Queue the parameter record for the next submission.
    pub fn write_params(&self, gpu: &GpuDevice, params: &ReactionDiffusionParameters) {
        gpu.queue.write_buffer(&self.params_buf, 0, params.as_bytes());
    }

    /// Record one dispatch reading `input` and writing `input.next()`.
    ///
    /// Returns `false` (and records nothing) if no field was bound yet.
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, input: BufferIndex) -> bool {
        let Some(groups) = &self.bind_groups else {
            log::warn!("{} dispatch skipped: no parameter field bound", self.model);
            return false;
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.model.entry_point()),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, groups.get(input), &[]);
        pass.dispatch_workgroups(self.dispatch.0, self.dispatch.1, 1);
        true
    }
}
