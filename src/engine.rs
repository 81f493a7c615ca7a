// ============================================================================
// ENGINE — the boundary the host application talks to
// ============================================================================
//
// Owns one backend plus the bookkeeping around it: configuration, the stroke
// state machine, redraw coalescing and the allocation-failure tracker.  Every
// per-draw failure is handled here (logged, operation skipped); only
// construction and explicit resize/export calls return errors.
// ============================================================================

use std::collections::HashMap;

use image::{Rgba, RgbaImage};

use crate::backend::{BackendKind, DrawingBackend, LayerDraw, PresentFilter};
use crate::brush::{line_stamps, Brush, PressureCurve, StampParams, WorldStamp};
use crate::canvas::{Layer, LayerId};
use crate::config::EngineConfig;
use crate::coords::world_to_local;
use crate::dirty::{DirtyRect, PixelRect};
use crate::error::{EngineError, EngineResult};
use crate::gpu::WgpuBackend;
use crate::raster::SoftwareBackend;
use crate::resample::unpremultiply_to_image;
use crate::stroke::{FrameScheduler, StrokePhase, StrokeTracker};
use crate::sync::{ensure_layer, pull_to_cpu};

/// Whether drawing calls are still honoured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    Ready,
    /// Too many consecutive allocation failures.  Surface `reason` to the
    /// user; every drawing call is now a no-op.
    Disabled { reason: String },
}

pub struct Engine<B: DrawingBackend> {
    backend: B,
    config: EngineConfig,
    status: EngineStatus,
    consecutive_failures: u32,
    stroke: StrokeTracker,
    scheduler: FrameScheduler,
    /// Stroke rects whose layer was not at hand when the stroke closed.
    deferred_sync: HashMap<LayerId, DirtyRect>,
}

/// Build an engine on the chosen backend.
pub fn init_engine(
    kind: BackendKind,
    width: u32,
    height: u32,
    config: EngineConfig,
) -> EngineResult<Engine<Box<dyn DrawingBackend>>> {
    let backend: Box<dyn DrawingBackend> = match kind {
        BackendKind::Software => Box::new(SoftwareBackend::new(width, height, &config)?),
        BackendKind::Gpu => Box::new(WgpuBackend::new(width, height, &config)?),
    };
    Engine::new(backend, config)
}

impl<B: DrawingBackend> Engine<B> {
    pub fn new(backend: B, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        if backend.supersample() != config.supersample {
            return Err(EngineError::init(format!(
                "backend supersample {} does not match config {}",
                backend.supersample(),
                config.supersample
            )));
        }
        let (w, h) = backend.canvas_size();
        tracing::info!("engine ready on {} backend, {w}×{h}", backend.name());
        Ok(Self {
            backend,
            config,
            status: EngineStatus::Ready,
            consecutive_failures: 0,
            stroke: StrokeTracker::default(),
            scheduler: FrameScheduler::default(),
            deferred_sync: HashMap::new(),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn is_enabled(&self) -> bool {
        self.status == EngineStatus::Ready
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.backend.canvas_size()
    }

    // ========================================================================
    // FAILURE TRACKING
    // ========================================================================

    /// Log a per-draw result and update the failure counter.  Returns whether
    /// the operation succeeded.
    fn settle(&mut self, what: &str, result: &EngineResult<()>) -> bool {
        match result {
            Ok(()) => {
                self.consecutive_failures = 0;
                true
            }
            Err(e) if e.is_recoverable() => {
                self.consecutive_failures += 1;
                tracing::warn!(
                    "{what} skipped ({}/{}): {e}",
                    self.consecutive_failures,
                    self.config.max_allocation_failures
                );
                if self.consecutive_failures >= self.config.max_allocation_failures {
                    let reason = format!(
                        "{} consecutive allocation failures, last: {e}",
                        self.consecutive_failures
                    );
                    tracing::error!("drawing disabled: {reason}");
                    self.status = EngineStatus::Disabled { reason };
                }
                false
            }
            Err(e) => {
                tracing::warn!("{what} failed: {e}");
                false
            }
        }
    }

    fn ensure_enabled(&self) -> EngineResult<()> {
        match &self.status {
            EngineStatus::Ready => Ok(()),
            EngineStatus::Disabled { reason } => Err(EngineError::Disabled(reason.clone())),
        }
    }

    // ========================================================================
    // BRUSH
    // ========================================================================

    /// One soft circle at a world position (base canvas pixels).
    pub fn stamp_circle(&mut self, layer: &mut Layer, center: [f32; 2], radius: f32, brush: &Brush) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if !(center[0].is_finite() && center[1].is_finite() && radius.is_finite()) {
            tracing::debug!("stamp_circle ignored non-finite input {center:?} r={radius}");
            return false;
        }
        let stamps = [WorldStamp { center, radius: radius.max(0.0) }];
        self.draw_stamps(layer, &stamps, brush)
    }

    /// A densely stamped segment.  `size` is the diameter at full pressure.
    #[allow(clippy::too_many_arguments)]
    pub fn stamp_line(
        &mut self,
        layer: &mut Layer,
        from: [f32; 2],
        to: [f32; 2],
        size: f32,
        brush: &Brush,
        pressure: [f32; 2],
        curve: &impl PressureCurve,
    ) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let Some(stamps) = line_stamps(from, to, size, pressure, curve, &self.config) else {
            tracing::debug!("stamp_line ignored non-finite input {from:?} → {to:?}");
            return false;
        };
        self.draw_stamps(layer, &stamps, brush)
    }

    fn draw_stamps(&mut self, layer: &mut Layer, stamps: &[WorldStamp], brush: &Brush) -> bool {
        let Some(inverse) = layer.model.inverse() else {
            tracing::debug!("layer {} has a singular transform, stamp skipped", layer.id());
            return false;
        };
        let ensured = ensure_layer(&mut self.backend, layer);
        if !self.settle("layer upload", &ensured) {
            return false;
        }

        let ss = self.backend.supersample();
        let scale = layer.model.linear_scale().max(f32::EPSILON);
        let color = brush.premultiplied();
        let softness = self.config.brush_softness;
        let mut dirty = DirtyRect::EMPTY;
        let params: Vec<StampParams> = stamps
            .iter()
            .map(|s| {
                dirty.include_circle(s.center[0], s.center[1], s.radius + softness / ss);
                StampParams {
                    center: world_to_local(&inverse, s.center, ss),
                    radius: s.radius * ss / scale,
                    color,
                    softness,
                }
            })
            .collect();

        let drawn = self.backend.stamp(layer.id(), &params, brush.mode());
        if !self.settle("stamp", &drawn) {
            return false;
        }
        layer.mark_gpu_written();
        self.stroke.record(layer.id(), &dirty);
        self.scheduler.request(&dirty);
        true
    }

    // ========================================================================
    // COMPOSITE / PRESENT
    // ========================================================================

    /// Redraw `dirty` (base canvas coordinates) of the composite buffer from
    /// `layers`, bottom to top.  Dirty layers are uploaded first.
    pub fn composite(&mut self, layers: &mut [Layer], dirty: DirtyRect) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let (cw, ch) = self.backend.composite_size();
        let Some(region) = dirty.to_pixel_rect(self.backend.supersample(), cw, ch) else {
            return false;
        };
        let mut draws = Vec::with_capacity(layers.len());
        for layer in layers.iter_mut().filter(|l| l.is_drawable()) {
            let ensured = ensure_layer(&mut self.backend, layer);
            if !self.settle("layer upload", &ensured) {
                if !self.is_enabled() {
                    return false;
                }
                continue;
            }
            draws.push(LayerDraw {
                id: layer.id(),
                blend: layer.blend_mode,
                opacity: layer.opacity.clamp(0.0, 1.0),
                model: layer.model,
            });
        }
        let result = self.backend.composite(&draws, region);
        self.settle("composite", &result)
    }

    /// Resolve `dirty` of the composite buffer onto the display target.
    pub fn present(&mut self, dirty: DirtyRect) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let (w, h) = self.backend.canvas_size();
        let Some(region) = dirty.to_pixel_rect(1.0, w, h) else {
            return false;
        };
        let filter = self.present_filter();
        let result = self.backend.present(region, filter);
        self.settle("present", &result)
    }

    fn present_filter(&self) -> PresentFilter {
        PresentFilter::Box4 {
            sharpness: self.config.present_sharpness,
        }
    }

    // ========================================================================
    // SYNC
    // ========================================================================

    /// Pull `dirty` (world coordinates) of the layer's texture back into its
    /// CPU buffer.  Empty rects and layers never drawn on are a no-op.
    pub fn sync_dirty_region_to_cpu(&mut self, layer: &mut Layer, dirty: DirtyRect) -> bool {
        match pull_to_cpu(&mut self.backend, layer, dirty) {
            Ok(synced) => {
                self.settle("sync", &Ok(()));
                synced
            }
            Err(e) => self.settle("sync", &Err(e)),
        }
    }

    // ========================================================================
    // STROKE LIFECYCLE
    // ========================================================================

    pub fn stroke_phase(&self) -> StrokePhase {
        self.stroke.phase()
    }

    /// Pointer down.  A stroke still open on another layer is closed and its
    /// rect is synced once that layer is passed back in.
    pub fn begin_stroke(&mut self, layer: &Layer) {
        if let Some((id, dirty)) = self.stroke.begin(layer.id()) {
            self.defer_sync(id, dirty);
        }
    }

    /// Pointer up: sync the stroke's dirty rect back to `layer`.  A stroke
    /// opened on a different layer is deferred, not dropped.
    pub fn end_stroke(&mut self, layer: &mut Layer) -> bool {
        let Some((id, dirty)) = self.stroke.finish() else {
            return false;
        };
        if id != layer.id() {
            tracing::warn!("end_stroke for layer {} but stroke was on {id}", layer.id());
        }
        self.defer_sync(id, dirty);
        let synced = self.sync_deferred(layer);
        self.stroke.reset();
        synced
    }

    fn defer_sync(&mut self, id: LayerId, dirty: DirtyRect) {
        if dirty.is_empty() {
            return;
        }
        let pending = self.deferred_sync.entry(id).or_default();
        *pending = pending.union(&dirty);
    }

    /// Sync whatever closed strokes left behind for `layer`.
    fn sync_deferred(&mut self, layer: &mut Layer) -> bool {
        match self.deferred_sync.remove(&layer.id()) {
            Some(dirty) => self.sync_dirty_region_to_cpu(layer, dirty),
            None => false,
        }
    }

    /// Layers with a closed but unsynced stroke.
    pub fn has_deferred_sync(&self, id: LayerId) -> bool {
        self.deferred_sync.contains_key(&id)
    }

    /// Abandoned gesture.  Stamps already drawn are kept and synced.
    pub fn cancel_stroke(&mut self, layer: &mut Layer) -> bool {
        self.end_stroke(layer)
    }

    // ========================================================================
    // FRAME SCHEDULING
    // ========================================================================

    pub fn request_redraw(&mut self, dirty: DirtyRect) {
        self.scheduler.request(&dirty);
    }

    pub fn redraw_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Per-frame tick: sync strokes left open on other layers, then one
    /// composite + present of everything requested since the last frame.
    /// Returns the region redrawn.
    pub fn frame(&mut self, layers: &mut [Layer]) -> Option<DirtyRect> {
        if !self.deferred_sync.is_empty() {
            for layer in layers.iter_mut() {
                self.sync_deferred(layer);
            }
        }
        let dirty = self.scheduler.take()?;
        if self.composite(layers, dirty) && self.present(dirty) {
            Some(dirty)
        } else {
            None
        }
    }

    // ========================================================================
    // RESOURCES
    // ========================================================================

    pub fn release_layer(&mut self, id: LayerId) {
        self.deferred_sync.remove(&id);
        self.backend.release_layer(id);
    }

    /// Reallocate the composite buffer and display target.  Layer textures
    /// follow lazily on their next upload.
    pub fn resize(&mut self, width: u32, height: u32) -> EngineResult<()> {
        self.ensure_enabled()?;
        let result = self.backend.resize(width, height);
        self.settle("resize", &result);
        result?;
        self.scheduler.request(&DirtyRect::full(width, height));
        Ok(())
    }

    // ========================================================================
    // EXPORT
    // ========================================================================

    /// Full composite + present + readback at base resolution, straight
    /// alpha, top-down.
    pub fn export_full_image(&mut self, layers: &mut [Layer]) -> EngineResult<RgbaImage> {
        self.ensure_enabled()?;
        let (w, h) = self.backend.canvas_size();
        let full = DirtyRect::full(w, h);
        if !self.composite(layers, full) || !self.present(full) {
            return Err(self.export_failure());
        }
        let readback = self.backend.read_display(PixelRect::full(w, h))?;
        let (rw, rh) = (readback.width, readback.height);
        Ok(unpremultiply_to_image(&readback.into_top_down(), rw, rh))
    }

    /// Composite every layer and resolve it into a `width × height` image
    /// without touching the display target.
    pub fn render_to_offscreen(&mut self, layers: &mut [Layer], width: u32, height: u32) -> EngineResult<RgbaImage> {
        self.ensure_enabled()?;
        let (w, h) = self.backend.canvas_size();
        if !self.composite(layers, DirtyRect::full(w, h)) {
            return Err(self.export_failure());
        }
        let filter = self.present_filter();
        let readback = self.backend.present_offscreen(width.max(1), height.max(1), filter)?;
        let (rw, rh) = (readback.width, readback.height);
        Ok(unpremultiply_to_image(&readback.into_top_down(), rw, rh))
    }

    fn export_failure(&self) -> EngineError {
        match &self.status {
            EngineStatus::Disabled { reason } => EngineError::Disabled(reason.clone()),
            EngineStatus::Ready => EngineError::allocation("full-canvas composite failed"),
        }
    }

    /// Straight colour of one display pixel, for hosts that colour-pick.
    pub fn display_pixel(&mut self, x: u32, y: u32) -> EngineResult<Rgba<u8>> {
        let readback = self.backend.read_display(PixelRect::new(x, y, 1, 1))?;
        if readback.data.len() < 4 {
            return Ok(Rgba([0, 0, 0, 0]));
        }
        let img = unpremultiply_to_image(&readback.into_top_down(), 1, 1);
        Ok(*img.get_pixel(0, 0))
    }
}
