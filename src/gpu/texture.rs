// ============================================================================
// LAYER TEXTURE — render target + sampled texture pair
// ============================================================================

use super::context::GpuContext;
use crate::error::{EngineError, EngineResult};

pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// One RGBA8 texture that is both drawn into (brush, compositor) and sampled
/// (compositor).  Holds premultiplied colour, rows top-down.
///
/// The wgpu analogue of a GL texture + framebuffer pair: the view is the
/// colour attachment, the bind group is what the compositor samples.
pub struct LayerTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub bind_group: wgpu::BindGroup,
    pub width: u32,
    pub height: u32,
}

impl LayerTexture {
    /// New textures are zero-initialised by wgpu, i.e. transparent.
    pub fn new(
        ctx: &GpuContext,
        bind_group_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
        label: &str,
    ) -> EngineResult<Self> {
        if !ctx.supports_size(width, height) {
            return Err(EngineError::allocation(format!(
                "{label} {width}×{height} exceeds device limit {}",
                ctx.max_texture_dim
            )));
        }
        let texture = ctx.try_allocate(label, |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;

        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("layer_texture_bg"),
            layout: bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
            return Err(EngineError::framebuffer(format!("{label}: {err}")));
        }

        Ok(Self {
            texture,
            view,
            bind_group,
            width,
            height,
        })
    }

    /// Full upload of premultiplied RGBA8 bytes, top-down.
    pub fn upload_full(&self, queue: &wgpu::Queue, data: &[u8]) {
        debug_assert_eq!(data.len(), (self.width * self.height * 4) as usize);

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Clear to transparent with an empty render pass.
    pub fn clear(&self, ctx: &GpuContext) {
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("layer_clear_encoder"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("layer_clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.view,
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
        }
        ctx.submit_one(encoder);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
