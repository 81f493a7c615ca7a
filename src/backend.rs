// ============================================================================
// DRAWING BACKEND — the seam between the engine and a raster implementation
// ============================================================================

use image::Rgba32FImage;

use crate::brush::{BrushMode, StampParams};
use crate::canvas::{BlendMode, LayerId};
use crate::coords::{Mat4, RowOrder};
use crate::dirty::PixelRect;
use crate::error::EngineResult;

/// One layer as the compositor sees it.
#[derive(Clone, Copy, Debug)]
pub struct LayerDraw {
    pub id: LayerId,
    pub blend: BlendMode,
    /// Already clamped to 0‥1.
    pub opacity: f32,
    pub model: Mat4,
}

/// Sampling mode of the compositor program.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PresentFilter {
    /// One bilinear tap; used when source and target share a resolution.
    Direct,
    /// Four taps at ±0.25 texel, then `box + sharpness * (box - ring)` where
    /// the ring is the same tap pattern at ±0.75 texel.
    Box4 { sharpness: f32 },
}

impl PresentFilter {
    /// Value of the `filter_mode` uniform.
    pub fn mode_index(&self) -> u32 {
        match self {
            PresentFilter::Direct => 0,
            PresentFilter::Box4 { .. } => 1,
        }
    }

    pub fn sharpness(&self) -> f32 {
        match self {
            PresentFilter::Direct => 0.0,
            PresentFilter::Box4 { sharpness } => *sharpness,
        }
    }
}

/// A pixel read.  `data` is premultiplied RGBA8, tightly packed, rows in
/// `row_order`.
#[derive(Clone, Debug, PartialEq)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub row_order: RowOrder,
}

impl Readback {
    /// Rows flipped to top-down if needed.
    pub fn into_top_down(mut self) -> Vec<u8> {
        crate::coords::to_top_down(&mut self.data, self.width, self.height, self.row_order);
        self.data
    }
}

/// Selected at construction time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// CPU emulation of the GL pipeline.
    #[default]
    Software,
    /// wgpu device (Vulkan / Metal / DX12 / GL).
    Gpu,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Software => "software",
            BackendKind::Gpu => "gpu",
        }
    }
}

/// Everything a raster implementation provides.  Coordinates are top-down
/// pixels; layer textures and the composite buffer are supersampled, the
/// display target is at base size.
pub trait DrawingBackend {
    fn name(&self) -> &str;

    /// Row order of what `read_*` returns.
    fn readback_row_order(&self) -> RowOrder;

    fn supersample(&self) -> f32;

    /// Base (display) size.
    fn canvas_size(&self) -> (u32, u32);

    /// Supersampled size of the composite buffer.
    fn composite_size(&self) -> (u32, u32);

    fn has_layer(&self, id: LayerId) -> bool;

    /// Supersampled texture size of a registered layer.
    fn layer_size(&self, id: LayerId) -> Option<(u32, u32)>;

    /// Create (or re-create at a new size) the texture + framebuffer for a
    /// layer, cleared to transparent.
    fn allocate_layer(&mut self, id: LayerId, width: u32, height: u32) -> EngineResult<()>;

    /// Replace a layer's texture contents with premultiplied, top-down data
    /// of the texture's size.
    fn upload_layer(&mut self, id: LayerId, pixels: &Rgba32FImage) -> EngineResult<()>;

    fn release_layer(&mut self, id: LayerId);

    /// Rasterize stamps in order.  Unknown layers are a no-op.
    fn stamp(&mut self, id: LayerId, stamps: &[StampParams], mode: BrushMode) -> EngineResult<()>;

    /// Redraw `region` (composite pixels) of the composite buffer from
    /// `layers`, bottom to top.
    fn composite(&mut self, layers: &[LayerDraw], region: PixelRect) -> EngineResult<()>;

    /// Resolve the composite buffer into `region` (base pixels) of the
    /// display target.
    fn present(&mut self, region: PixelRect, filter: PresentFilter) -> EngineResult<()>;

    /// Resolve the composite buffer into a fresh `width × height` target and
    /// read all of it back.
    fn present_offscreen(&mut self, width: u32, height: u32, filter: PresentFilter) -> EngineResult<Readback>;

    /// `None` when the layer has no texture yet.
    fn read_layer(&mut self, id: LayerId, rect: PixelRect) -> EngineResult<Option<Readback>>;

    fn read_display(&mut self, rect: PixelRect) -> EngineResult<Readback>;

    /// Reallocate the composite buffer and display target.  Layer textures
    /// are left alone.
    fn resize(&mut self, width: u32, height: u32) -> EngineResult<()>;
}

impl DrawingBackend for Box<dyn DrawingBackend> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn readback_row_order(&self) -> RowOrder {
        (**self).readback_row_order()
    }

    fn supersample(&self) -> f32 {
        (**self).supersample()
    }

    fn canvas_size(&self) -> (u32, u32) {
        (**self).canvas_size()
    }

    fn composite_size(&self) -> (u32, u32) {
        (**self).composite_size()
    }

    fn has_layer(&self, id: LayerId) -> bool {
        (**self).has_layer(id)
    }

    fn layer_size(&self, id: LayerId) -> Option<(u32, u32)> {
        (**self).layer_size(id)
    }

    fn allocate_layer(&mut self, id: LayerId, width: u32, height: u32) -> EngineResult<()> {
        (**self).allocate_layer(id, width, height)
    }

    fn upload_layer(&mut self, id: LayerId, pixels: &Rgba32FImage) -> EngineResult<()> {
        (**self).upload_layer(id, pixels)
    }

    fn release_layer(&mut self, id: LayerId) {
        (**self).release_layer(id)
    }

    fn stamp(&mut self, id: LayerId, stamps: &[StampParams], mode: BrushMode) -> EngineResult<()> {
        (**self).stamp(id, stamps, mode)
    }

    fn composite(&mut self, layers: &[LayerDraw], region: PixelRect) -> EngineResult<()> {
        (**self).composite(layers, region)
    }

    fn present(&mut self, region: PixelRect, filter: PresentFilter) -> EngineResult<()> {
        (**self).present(region, filter)
    }

    fn present_offscreen(&mut self, width: u32, height: u32, filter: PresentFilter) -> EngineResult<Readback> {
        (**self).present_offscreen(width, height, filter)
    }

    fn read_layer(&mut self, id: LayerId, rect: PixelRect) -> EngineResult<Option<Readback>> {
        (**self).read_layer(id, rect)
    }

    fn read_display(&mut self, rect: PixelRect) -> EngineResult<Readback> {
        (**self).read_display(rect)
    }

    fn resize(&mut self, width: u32, height: u32) -> EngineResult<()> {
        (**self).resize(width, height)
    }
}
