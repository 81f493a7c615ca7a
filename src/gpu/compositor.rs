// ============================================================================
// COMPOSITOR — layer composition and present pipelines
// ============================================================================
//
// One pipeline per blend mode, all running the same compositor program with
// hardware (fixed-function) blending.  The factor table is shared with the
// software backend.  A fifth pipeline with blending disabled resolves the
// composite buffer onto the display target.
// ============================================================================

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::context::{quad_layout, GpuContext};
use super::texture::{LayerTexture, TEXTURE_FORMAT};
use crate::backend::PresentFilter;
use crate::canvas::BlendMode;
use crate::coords::Mat4;
use crate::error::{EngineError, EngineResult};
use crate::raster::blend::{BlendFactor, BlendState};

// ============================================================================
// UNIFORM TYPES
// ============================================================================

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct CompositeUniforms {
    pub mvp: [[f32; 4]; 4],
    pub src_size: [f32; 2],
    pub opacity: f32,
    pub filter_mode: u32,
    pub sharpness: f32,
    pub _pad: [f32; 3],
}

impl CompositeUniforms {
    pub fn new(mvp: Mat4, src_size: (u32, u32), opacity: f32, filter: PresentFilter) -> Self {
        Self {
            mvp: mvp.cols,
            src_size: [src_size.0 as f32, src_size.1 as f32],
            opacity,
            filter_mode: filter.mode_index(),
            sharpness: filter.sharpness(),
            _pad: [0.0; 3],
        }
    }
}

fn wgpu_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
    }
}

/// Fixed-function table → wgpu blend state.
pub fn wgpu_blend(state: BlendState) -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu_factor(state.color.src),
            dst_factor: wgpu_factor(state.color.dst),
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu_factor(state.alpha.src),
            dst_factor: wgpu_factor(state.alpha.dst),
            operation: wgpu::BlendOperation::Add,
        },
    }
}

/// Bind group layout with a single uniform buffer at binding 0.
pub fn uniform_layout(device: &wgpu::Device, label: &str, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

/// Grow-only list of uniform buffers + bind groups, one per draw in a
/// submission, refreshed with `queue.write_buffer()`.
pub struct UniformSlots {
    label: &'static str,
    slots: Vec<(wgpu::Buffer, wgpu::BindGroup)>,
}

impl UniformSlots {
    pub fn new(label: &'static str) -> Self {
        Self { label, slots: Vec::new() }
    }

    /// Write `values[i]` into slot `i`, allocating slots as needed.
    pub fn write<T: Pod>(&mut self, ctx: &GpuContext, layout: &wgpu::BindGroupLayout, values: &[T]) {
        for (i, value) in values.iter().enumerate() {
            if i >= self.slots.len() {
                let buf = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(self.label),
                    contents: bytemuck::bytes_of(value),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
                let bg = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(self.label),
                    layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buf.as_entire_binding(),
                    }],
                });
                self.slots.push((buf, bg));
            } else {
                ctx.queue.write_buffer(&self.slots[i].0, 0, bytemuck::bytes_of(value));
            }
        }
    }

    pub fn bind_group(&self, i: usize) -> &wgpu::BindGroup {
        &self.slots[i].1
    }
}

// ============================================================================
// COMPOSITOR
// ============================================================================

pub struct Compositor {
    /// Indexed by `BlendMode::to_u8()`.
    blend_pipelines: Vec<wgpu::RenderPipeline>,
    present_pipeline: wgpu::RenderPipeline,
    pub uniform_bgl: wgpu::BindGroupLayout,
    pub texture_bgl: wgpu::BindGroupLayout,
    pub sampler: wgpu::Sampler,
    layer_slots: UniformSlots,
    present_slots: UniformSlots,
}

impl Compositor {
    pub fn new(ctx: &GpuContext) -> EngineResult<Self> {
        let device = &ctx.device;
        let shader = ctx.compile_program("compositor", super::shaders::COMPOSITOR_SHADER)?;

        let uniform_bgl = uniform_layout(
            device,
            "composite_uniform_bgl",
            wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        );

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite_texture_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite_pipeline_layout"),
            bind_group_layouts: &[&uniform_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, blend: Option<wgpu::BlendState>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_composite",
                    buffers: &[quad_layout()],
                    compilation_options: Default::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_composite",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TEXTURE_FORMAT,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                multiview: None,
            })
        };

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let blend_pipelines = BlendMode::all()
            .iter()
            .map(|mode| {
                make_pipeline(
                    format!("composite_{}", mode.name().to_lowercase()).as_str(),
                    Some(wgpu_blend(BlendState::for_layer(*mode))),
                )
            })
            .collect();
        let present_pipeline = make_pipeline("present", None);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(EngineError::shader("compositor", err.to_string()));
        }

        // Clamp-to-edge is the wgpu default address mode.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sampler_linear"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            blend_pipelines,
            present_pipeline,
            uniform_bgl,
            texture_bgl,
            sampler,
            layer_slots: UniformSlots::new("composite_uniform_buf"),
            present_slots: UniformSlots::new("present_uniform_buf"),
        })
    }

    /// Clear `target` and draw `layers` bottom to top.
    pub fn composite(
        &mut self,
        ctx: &GpuContext,
        target: &LayerTexture,
        layers: &[(&LayerTexture, BlendMode, CompositeUniforms)],
    ) {
        let uniforms: Vec<CompositeUniforms> = layers.iter().map(|(_, _, u)| *u).collect();
        self.layer_slots.write(ctx, &self.uniform_bgl, &uniforms);

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("composite_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("composite_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_vertex_buffer(0, ctx.quad.slice(..));
            for (i, (layer, mode, _)) in layers.iter().enumerate() {
                pass.set_pipeline(&self.blend_pipelines[mode.to_u8() as usize]);
                pass.set_bind_group(0, self.layer_slots.bind_group(i), &[]);
                pass.set_bind_group(1, &layer.bind_group, &[]);
                pass.draw(0..6, 0..1);
            }
        }
        ctx.submit_one(encoder);
    }

    /// Resample `source` over the whole of `target` with blending disabled.
    pub fn resolve(&mut self, ctx: &GpuContext, source: &LayerTexture, target: &LayerTexture, filter: PresentFilter) {
        let (dw, dh) = (target.width as f32, target.height as f32);
        let (sw, sh) = (source.width as f32, source.height as f32);
        let mvp = crate::coords::projection(dw, dh) * Mat4::scale(dw / sw, dh / sh);
        let uniforms = CompositeUniforms::new(mvp, source.size(), 1.0, filter);
        self.present_slots.write(ctx, &self.uniform_bgl, &[uniforms]);

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("present_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("present_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.present_pipeline);
            pass.set_vertex_buffer(0, ctx.quad.slice(..));
            pass.set_bind_group(0, self.present_slots.bind_group(0), &[]);
            pass.set_bind_group(1, &source.bind_group, &[]);
            pass.draw(0..6, 0..1);
        }
        ctx.submit_one(encoder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 96);
    }

    #[test]
    fn blend_table_maps_to_wgpu_factors() {
        let screen = wgpu_blend(BlendState::for_layer(BlendMode::Screen));
        assert_eq!(screen.color.dst_factor, wgpu::BlendFactor::OneMinusSrc);
        assert_eq!(screen.alpha.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
        let multiply = wgpu_blend(BlendState::for_layer(BlendMode::Multiply));
        assert_eq!(multiply.color.src_factor, wgpu::BlendFactor::Dst);
        let erase = wgpu_blend(BlendState::ERASE);
        assert_eq!(erase.alpha.src_factor, wgpu::BlendFactor::Zero);
    }
}
