// ============================================================================
// GPU RENDERER — the wgpu implementation of `DrawingBackend`
// ============================================================================
//
// Owns one texture per layer (recycled through the pool), the supersampled
// composite buffer and the base-size display target.  All draws are
// synchronous submissions; reads block on `map_async`.  Composite and present
// passes clear and redraw their whole target, so the region arguments only
// bound what the engine later reads.
// ============================================================================

use std::collections::HashMap;

use image::Rgba32FImage;

use super::brush::BrushPipeline;
use super::compositor::{CompositeUniforms, Compositor};
use super::context::GpuContext;
use super::pool::TexturePool;
use super::readback::StagingBuffer;
use super::texture::LayerTexture;
use crate::backend::{DrawingBackend, LayerDraw, PresentFilter, Readback};
use crate::brush::{BrushMode, StampParams};
use crate::canvas::LayerId;
use crate::config::EngineConfig;
use crate::coords::{projection, supersampled_extent, RowOrder};
use crate::dirty::PixelRect;
use crate::error::{EngineError, EngineResult};
use crate::resample::quantize;

/// Row order of every wgpu readback: texture row 0 is the top.
pub const GPU_ROW_ORDER: RowOrder = RowOrder::TopDown;

pub struct WgpuBackend {
    ctx: GpuContext,
    compositor: Compositor,
    brush: BrushPipeline,
    pool: TexturePool,
    layers: HashMap<LayerId, LayerTexture>,
    composite: LayerTexture,
    display: LayerTexture,
    supersample: f32,
    width: u32,
    height: u32,
    max_dimension: u32,
    staging: StagingBuffer,
}

impl WgpuBackend {
    /// Any failure here (no adapter, program compile, target allocation) is
    /// fatal for the backend and comes back as `Init` or `ShaderCompile`.
    pub fn new(width: u32, height: u32, config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let ctx = GpuContext::new(&config.preferred_gpu)?;
        let compositor = Compositor::new(&ctx)?;
        let brush = BrushPipeline::new(&ctx)?;
        let ss = config.supersample;
        let max_dimension = config.max_texture_dimension.min(ctx.max_texture_dim);
        let (composite, display) = Self::targets(&ctx, &compositor, width, height, ss, max_dimension)
            .map_err(|e| EngineError::init(e.to_string()))?;

        tracing::info!(
            "wgpu backend on {}: {width}×{height} (composite {}×{}, SS {ss})",
            ctx.adapter_name,
            composite.width,
            composite.height
        );

        Ok(Self {
            ctx,
            compositor,
            brush,
            pool: TexturePool::new(),
            layers: HashMap::new(),
            composite,
            display,
            supersample: ss,
            width,
            height,
            max_dimension,
            staging: StagingBuffer::new(),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    /// Approximate GPU memory held by live layer textures (bytes).
    pub fn active_texture_memory(&self) -> usize {
        self.layers
            .values()
            .map(|t| t.width as usize * t.height as usize * 4)
            .sum()
    }

    pub fn pooled_texture_memory(&self) -> usize {
        self.pool.pooled_memory_bytes()
    }

    fn new_texture(
        ctx: &GpuContext,
        compositor: &Compositor,
        width: u32,
        height: u32,
        max_dimension: u32,
        label: &str,
    ) -> EngineResult<LayerTexture> {
        if width > max_dimension || height > max_dimension {
            return Err(EngineError::allocation(format!(
                "{label} {width}×{height} exceeds {max_dimension}"
            )));
        }
        LayerTexture::new(ctx, &compositor.texture_bgl, &compositor.sampler, width, height, label)
    }

    fn targets(
        ctx: &GpuContext,
        compositor: &Compositor,
        width: u32,
        height: u32,
        ss: f32,
        max_dimension: u32,
    ) -> EngineResult<(LayerTexture, LayerTexture)> {
        let composite = Self::new_texture(
            ctx,
            compositor,
            supersampled_extent(width, ss),
            supersampled_extent(height, ss),
            max_dimension,
            "composite_target",
        )?;
        let display = Self::new_texture(ctx, compositor, width, height, max_dimension, "display_target")?;
        Ok((composite, display))
    }

    fn read_texture(&mut self, which: Target, rect: PixelRect) -> EngineResult<Option<Readback>> {
        let texture = match which {
            Target::Layer(id) => match self.layers.get(&id) {
                Some(t) => t,
                None => return Ok(None),
            },
            Target::Display => &self.display,
        };
        let Some(rect) = rect.intersect(&PixelRect::full(texture.width, texture.height)) else {
            return Ok(Some(Readback {
                width: 0,
                height: 0,
                data: Vec::new(),
                row_order: GPU_ROW_ORDER,
            }));
        };
        self.staging.read(&self.ctx, &texture.texture, rect).map(Some)
    }
}

#[derive(Clone, Copy)]
enum Target {
    Layer(LayerId),
    Display,
}

impl DrawingBackend for WgpuBackend {
    fn name(&self) -> &str {
        "gpu"
    }

    fn readback_row_order(&self) -> RowOrder {
        GPU_ROW_ORDER
    }

    fn supersample(&self) -> f32 {
        self.supersample
    }

    fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn composite_size(&self) -> (u32, u32) {
        self.composite.size()
    }

    fn has_layer(&self, id: LayerId) -> bool {
        self.layers.contains_key(&id)
    }

    fn layer_size(&self, id: LayerId) -> Option<(u32, u32)> {
        self.layers.get(&id).map(LayerTexture::size)
    }

    fn allocate_layer(&mut self, id: LayerId, width: u32, height: u32) -> EngineResult<()> {
        if let Some(old) = self.layers.remove(&id) {
            self.pool.release(old);
        }
        let texture = match self.pool.acquire(width, height) {
            Some(recycled) => {
                recycled.clear(&self.ctx);
                recycled
            }
            None => Self::new_texture(
                &self.ctx,
                &self.compositor,
                width,
                height,
                self.max_dimension,
                "layer_texture",
            )?,
        };
        tracing::debug!("layer {id}: allocated {width}×{height} texture");
        self.layers.insert(id, texture);
        Ok(())
    }

    fn upload_layer(&mut self, id: LayerId, pixels: &Rgba32FImage) -> EngineResult<()> {
        let Some(texture) = self.layers.get(&id) else {
            return Err(EngineError::allocation(format!("layer {id} has no texture")));
        };
        if pixels.dimensions() != texture.size() {
            return Err(EngineError::allocation(format!(
                "upload of {}×{} into {}×{} texture",
                pixels.width(),
                pixels.height(),
                texture.width,
                texture.height
            )));
        }
        let bytes: Vec<u8> = pixels.pixels().flat_map(|p| quantize(p.0)).collect();
        texture.upload_full(&self.ctx.queue, &bytes);
        Ok(())
    }

    fn release_layer(&mut self, id: LayerId) {
        if let Some(texture) = self.layers.remove(&id) {
            self.pool.release(texture);
            tracing::debug!(
                "layer {id}: texture returned to pool ({} pooled, {} KiB pooled, {} KiB live)",
                self.pool.pooled_count(),
                self.pooled_texture_memory() / 1024,
                self.active_texture_memory() / 1024
            );
        }
    }

    fn stamp(&mut self, id: LayerId, stamps: &[StampParams], mode: BrushMode) -> EngineResult<()> {
        if let Some(target) = self.layers.get(&id) {
            self.brush.stamp(&self.ctx, target, stamps, mode)?;
        }
        Ok(())
    }

    fn composite(&mut self, layers: &[LayerDraw], _region: PixelRect) -> EngineResult<()> {
        let (cw, ch) = self.composite.size();
        let view = projection(cw as f32, ch as f32);
        let draws: Vec<_> = layers
            .iter()
            .filter_map(|draw| {
                let texture = self.layers.get(&draw.id)?;
                let uniforms =
                    CompositeUniforms::new(view * draw.model, texture.size(), draw.opacity, PresentFilter::Direct);
                Some((texture, draw.blend, uniforms))
            })
            .collect();
        self.compositor.composite(&self.ctx, &self.composite, &draws);
        Ok(())
    }

    fn present(&mut self, _region: PixelRect, filter: PresentFilter) -> EngineResult<()> {
        self.compositor.resolve(&self.ctx, &self.composite, &self.display, filter);
        Ok(())
    }

    fn present_offscreen(&mut self, width: u32, height: u32, filter: PresentFilter) -> EngineResult<Readback> {
        let target = Self::new_texture(
            &self.ctx,
            &self.compositor,
            width,
            height,
            self.max_dimension,
            "offscreen_target",
        )?;
        self.compositor.resolve(&self.ctx, &self.composite, &target, filter);
        self.staging.read(&self.ctx, &target.texture, PixelRect::full(width, height))
    }

    fn read_layer(&mut self, id: LayerId, rect: PixelRect) -> EngineResult<Option<Readback>> {
        self.read_texture(Target::Layer(id), rect)
    }

    fn read_display(&mut self, rect: PixelRect) -> EngineResult<Readback> {
        self.read_texture(Target::Display, rect)
            .map(|r| r.unwrap_or(Readback { width: 0, height: 0, data: Vec::new(), row_order: GPU_ROW_ORDER }))
    }

    fn resize(&mut self, width: u32, height: u32) -> EngineResult<()> {
        let (composite, display) = Self::targets(
            &self.ctx,
            &self.compositor,
            width,
            height,
            self.supersample,
            self.max_dimension,
        )?;
        self.composite = composite;
        self.display = display;
        self.width = width;
        self.height = height;
        tracing::info!(
            "wgpu backend resized to {width}×{height} (composite {}×{})",
            self.composite.width,
            self.composite.height
        );
        Ok(())
    }
}
