// ============================================================================
// BRUSH PIPELINE — soft round stamps rendered into a layer texture
// ============================================================================
//
// A whole batch of stamps is one instanced draw of the unit quad: the view
// projection lives in a single uniform buffer, every stamp is one instance
// in a grow-only vertex buffer.  Instances rasterize and blend in order.
// ============================================================================

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::compositor::{uniform_layout, wgpu_blend};
use super::context::{quad_layout, GpuContext};
use super::texture::{LayerTexture, TEXTURE_FORMAT};
use crate::brush::{BrushMode, StampParams};
use crate::coords::projection;
use crate::error::{EngineError, EngineResult};
use crate::raster::blend::BlendState;

/// Per-stamp instance data, matching `Stamp` in the WGSL.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct StampInstance {
    pub color: [f32; 4],
    pub center: [f32; 2],
    /// Radius, softness, margin.
    pub shape: [f32; 3],
}

impl From<&StampParams> for StampInstance {
    fn from(stamp: &StampParams) -> Self {
        Self {
            color: stamp.color,
            center: stamp.center,
            shape: [stamp.radius, stamp.softness, stamp.margin()],
        }
    }
}

const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![1 => Float32x4, 2 => Float32x2, 3 => Float32x3];

fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<StampInstance>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRIBUTES,
    }
}

/// Instance capacity for `needed` stamps: next power of two, at least 64.
fn instance_capacity(needed: usize) -> usize {
    needed.max(64).next_power_of_two()
}

pub struct BrushPipeline {
    paint: wgpu::RenderPipeline,
    erase: wgpu::RenderPipeline,
    view_buffer: wgpu::Buffer,
    view_bind_group: wgpu::BindGroup,
    /// Instance buffer and its capacity in stamps.
    instances: Option<(wgpu::Buffer, usize)>,
}

impl BrushPipeline {
    pub fn new(ctx: &GpuContext) -> EngineResult<Self> {
        let device = &ctx.device;
        let shader = ctx.compile_program("brush", super::shaders::BRUSH_SHADER)?;
        let view_bgl = uniform_layout(device, "brush_view_bgl", wgpu::ShaderStages::VERTEX);
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("brush_pipeline_layout"),
            bind_group_layouts: &[&view_bgl],
            push_constant_ranges: &[],
        });

        let make_pipeline = |label: &str, mode: BrushMode| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_brush",
                    buffers: &[quad_layout(), instance_layout()],
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
                    entry_point: "fs_brush",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TEXTURE_FORMAT,
                        blend: Some(wgpu_blend(BlendState::for_brush(mode))),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                multiview: None,
            })
        };

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let paint = make_pipeline("brush_paint", BrushMode::Paint);
        let erase = make_pipeline("brush_erase", BrushMode::Erase);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(EngineError::shader("brush", err.to_string()));
        }

        let view_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("brush_view_buf"),
            contents: bytemuck::bytes_of(&projection(1.0, 1.0).cols),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let view_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("brush_view_bg"),
            layout: &view_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: view_buffer.as_entire_binding(),
            }],
        });

        Ok(Self {
            paint,
            erase,
            view_buffer,
            view_bind_group,
            instances: None,
        })
    }

    /// Upload `stamps` as instances, growing the buffer when it is too small.
    fn write_instances(&mut self, ctx: &GpuContext, stamps: &[StampInstance]) -> EngineResult<()> {
        let fits = matches!(&self.instances, Some((_, capacity)) if *capacity >= stamps.len());
        if !fits {
            let capacity = instance_capacity(stamps.len());
            let buffer = ctx.try_allocate("brush instance buffer", |device| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("brush_instance_buf"),
                    size: (capacity * std::mem::size_of::<StampInstance>()) as u64,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })?;
            tracing::debug!("brush instance buffer grown to {capacity} stamps");
            self.instances = Some((buffer, capacity));
        }
        let Some((buffer, _)) = self.instances.as_ref() else {
            return Err(EngineError::allocation("brush instance buffer missing"));
        };
        ctx.queue.write_buffer(buffer, 0, bytemuck::cast_slice(stamps));
        Ok(())
    }

    /// Draw `stamps` in order into `target`, keeping its existing contents.
    pub fn stamp(
        &mut self,
        ctx: &GpuContext,
        target: &LayerTexture,
        stamps: &[StampParams],
        mode: BrushMode,
    ) -> EngineResult<()> {
        if stamps.is_empty() {
            return Ok(());
        }
        let proj = projection(target.width as f32, target.height as f32).cols;
        ctx.queue.write_buffer(&self.view_buffer, 0, bytemuck::bytes_of(&proj));
        let instances: Vec<StampInstance> = stamps.iter().map(StampInstance::from).collect();
        let count = instances.len() as u32;
        self.write_instances(ctx, &instances)?;

        let pipeline = match mode {
            BrushMode::Paint => &self.paint,
            BrushMode::Erase => &self.erase,
        };
        let Some((instance_buffer, _)) = self.instances.as_ref() else {
            return Err(EngineError::allocation("brush instance buffer missing"));
        };

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("brush_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("brush_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.view_bind_group, &[]);
            pass.set_vertex_buffer(0, ctx.quad.slice(..));
            pass.set_vertex_buffer(1, instance_buffer.slice(..));
            pass.draw(0..6, 0..count);
        }
        ctx.submit_one(encoder);
        Ok(())
    }
}
