// ============================================================================
// SOFTWARE BACKEND — the GL pipeline emulated on the CPU
// ============================================================================
//
// Float premultiplied render targets with bottom-up storage, fixed-function
// blending and scissored clears.  Behaves like the wgpu backend apart from
// the row order of its reads, which the engine corrects through `coords`.
// ============================================================================

pub mod blend;
pub mod program;
pub mod rasterize;
pub mod surface;

use std::collections::HashMap;

use image::Rgba32FImage;

use crate::backend::{DrawingBackend, LayerDraw, PresentFilter, Readback};
use crate::brush::{BrushMode, StampParams};
use crate::canvas::LayerId;
use crate::config::EngineConfig;
use crate::coords::{projection, supersampled_extent, Mat4, RowOrder};
use crate::dirty::PixelRect;
use crate::error::{EngineError, EngineResult};

use blend::BlendState;
use program::{brush_fragment, compositor_fragment};
use rasterize::{draw_quad, Quad};
use surface::{Surface, SURFACE_ROW_ORDER};

pub struct SoftwareBackend {
    supersample: f32,
    max_dimension: u32,
    width: u32,
    height: u32,
    layers: HashMap<LayerId, Surface>,
    composite: Surface,
    display: Surface,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32, config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let ss = config.supersample;
        let (composite, display) = Self::targets(width, height, ss, config.max_texture_dimension)
            .map_err(|e| EngineError::init(e.to_string()))?;
        tracing::info!(
            "software backend {}×{} (composite {}×{}, SS {ss})",
            width,
            height,
            composite.width(),
            composite.height()
        );
        Ok(Self {
            supersample: ss,
            max_dimension: config.max_texture_dimension,
            width,
            height,
            layers: HashMap::new(),
            composite,
            display,
        })
    }

    fn targets(width: u32, height: u32, ss: f32, max_dimension: u32) -> EngineResult<(Surface, Surface)> {
        let composite = Surface::try_new(
            supersampled_extent(width, ss),
            supersampled_extent(height, ss),
            max_dimension,
        )?;
        let display = Surface::try_new(width, height, max_dimension)?;
        Ok((composite, display))
    }

    /// Number of layers with a live texture.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn resolve(composite: &Surface, target: &mut Surface, region: PixelRect, filter: PresentFilter) {
        let (dw, dh) = (target.width() as f32, target.height() as f32);
        let sx = composite.width() as f32 / dw;
        let sy = composite.height() as f32 / dh;
        target.clear(region);
        draw_quad(
            target,
            region,
            &projection(dw, dh),
            Quad::new([0.0, 0.0], [dw, dh]),
            BlendState::REPLACE,
            |p| Some(compositor_fragment(composite, [p[0] * sx, p[1] * sy], 1.0, filter)),
        );
    }
}

impl DrawingBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn readback_row_order(&self) -> RowOrder {
        SURFACE_ROW_ORDER
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
        self.layers.get(&id).map(Surface::size)
    }

    fn allocate_layer(&mut self, id: LayerId, width: u32, height: u32) -> EngineResult<()> {
        let surface = Surface::try_new(width, height, self.max_dimension)?;
        tracing::debug!("layer {id}: allocated {width}×{height} surface");
        self.layers.insert(id, surface);
        Ok(())
    }

    fn upload_layer(&mut self, id: LayerId, pixels: &Rgba32FImage) -> EngineResult<()> {
        match self.layers.get_mut(&id) {
            Some(surface) => surface.upload(pixels),
            None => Err(EngineError::allocation(format!("layer {id} has no surface"))),
        }
    }

    fn release_layer(&mut self, id: LayerId) {
        if self.layers.remove(&id).is_some() {
            tracing::debug!("layer {id}: surface released");
        }
    }

    fn stamp(&mut self, id: LayerId, stamps: &[StampParams], mode: BrushMode) -> EngineResult<()> {
        let Some(target) = self.layers.get_mut(&id) else {
            return Ok(());
        };
        let mvp = projection(target.width() as f32, target.height() as f32);
        let bounds = target.bounds();
        let blend = BlendState::for_brush(mode);
        for stamp in stamps {
            draw_quad(
                target,
                bounds,
                &mvp,
                Quad::around(stamp.center, stamp.radius + stamp.margin()),
                blend,
                |p| brush_fragment(stamp, p),
            );
        }
        Ok(())
    }

    fn composite(&mut self, layers: &[LayerDraw], region: PixelRect) -> EngineResult<()> {
        let Self { layers: surfaces, composite, .. } = self;
        let view = projection(composite.width() as f32, composite.height() as f32);
        composite.clear(region);
        for draw in layers {
            let Some(src) = surfaces.get(&draw.id) else {
                continue;
            };
            let mvp: Mat4 = view * draw.model;
            draw_quad(
                composite,
                region,
                &mvp,
                Quad::new([0.0, 0.0], [src.width() as f32, src.height() as f32]),
                BlendState::for_layer(draw.blend),
                |p| Some(compositor_fragment(src, p, draw.opacity, PresentFilter::Direct)),
            );
        }
        Ok(())
    }

    fn present(&mut self, region: PixelRect, filter: PresentFilter) -> EngineResult<()> {
        Self::resolve(&self.composite, &mut self.display, region, filter);
        Ok(())
    }

    fn present_offscreen(&mut self, width: u32, height: u32, filter: PresentFilter) -> EngineResult<Readback> {
        let mut target = Surface::try_new(width, height, self.max_dimension)?;
        let full = target.bounds();
        Self::resolve(&self.composite, &mut target, full, filter);
        Ok(target.read(full))
    }

    fn read_layer(&mut self, id: LayerId, rect: PixelRect) -> EngineResult<Option<Readback>> {
        Ok(self.layers.get(&id).map(|surface| surface.read(rect)))
    }

    fn read_display(&mut self, rect: PixelRect) -> EngineResult<Readback> {
        Ok(self.display.read(rect))
    }

    fn resize(&mut self, width: u32, height: u32) -> EngineResult<()> {
        let (composite, display) = Self::targets(width, height, self.supersample, self.max_dimension)?;
        self.composite = composite;
        self.display = display;
        self.width = width;
        self.height = height;
        tracing::info!(
            "software backend resized to {width}×{height} (composite {}×{})",
            self.composite.width(),
            self.composite.height()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::BlendMode;
    use image::Rgba;

    fn backend(w: u32, h: u32, ss: f32) -> SoftwareBackend {
        let config = EngineConfig { supersample: ss, ..EngineConfig::default() };
        SoftwareBackend::new(w, h, &config).unwrap()
    }

    #[test]
    fn construction_sizes_targets() {
        let b = backend(10, 7, 2.0);
        assert_eq!(b.composite_size(), (20, 14));
        assert_eq!(b.canvas_size(), (10, 7));
        assert_eq!(b.readback_row_order(), RowOrder::BottomUp);
    }

    #[test]
    fn stamp_on_unknown_layer_is_a_no_op() {
        let mut b = backend(4, 4, 1.0);
        let stamp = StampParams { center: [1.0, 1.0], radius: 1.0, color: [1.0; 4], softness: 1.0 };
        assert!(b.stamp(LayerId::next(), &[stamp], BrushMode::Paint).is_ok());
        assert!(b.read_layer(LayerId::next(), PixelRect::full(4, 4)).unwrap().is_none());
    }

    #[test]
    fn composite_then_present_shows_layer() {
        let mut b = backend(4, 4, 2.0);
        let id = LayerId::next();
        b.allocate_layer(id, 8, 8).unwrap();
        b.upload_layer(id, &Rgba32FImage::from_pixel(8, 8, Rgba([0.0, 0.0, 1.0, 1.0]))).unwrap();
        let draw = LayerDraw { id, blend: BlendMode::Normal, opacity: 1.0, model: Mat4::IDENTITY };
        b.composite(&[draw], PixelRect::full(8, 8)).unwrap();
        b.present(PixelRect::full(4, 4), PresentFilter::Box4 { sharpness: 0.2 }).unwrap();
        let rb = b.read_display(PixelRect::full(4, 4)).unwrap();
        assert!(rb.data.chunks(4).all(|p| p == [0, 0, 255, 255]));
    }

    #[test]
    fn resize_reallocates_composite_only() {
        let mut b = backend(4, 4, 2.0);
        let id = LayerId::next();
        b.allocate_layer(id, 8, 8).unwrap();
        b.resize(6, 3).unwrap();
        assert_eq!(b.composite_size(), (12, 6));
        assert_eq!(b.layer_size(id), Some((8, 8)));
        assert_eq!(b.layer_count(), 1);
        b.release_layer(id);
        assert_eq!(b.layer_count(), 0);
    }
}
