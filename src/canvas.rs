use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::coords::Mat4;
use crate::error::{EngineError, EngineResult};

// ============================================================================
// LAYER IDENTITY
// ============================================================================

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable integer identity of a layer.  GPU resources are keyed by this, never
/// by the layer's position in the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(u64);

impl LayerId {
    pub fn next() -> Self {
        LayerId(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// BLEND MODES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Add,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Add,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Add => "Add",
        }
    }

    /// Stable index, also used to pick the compositor pipeline.
    pub fn to_u8(&self) -> u8 {
        match self {
            BlendMode::Normal => 0,
            BlendMode::Multiply => 1,
            BlendMode::Screen => 2,
            BlendMode::Add => 3,
        }
    }

    /// Reconstruct from a u8 (defaults to Normal for unknown values)
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => BlendMode::Multiply,
            2 => BlendMode::Screen,
            3 => BlendMode::Add,
            _ => BlendMode::Normal,
        }
    }
}

// ============================================================================
// LAYER
// ============================================================================

/// The persistent drawing unit.
///
/// The CPU buffer (`RgbaImage`, straight alpha, top-down) is the source of
/// truth for undo snapshots and export.  The GPU texture is a cache of it,
/// kept in step by two one-way flags:
///
/// * `cpu_dirty`: the CPU buffer changed, the texture must be re-uploaded.
/// * `gpu_ahead`: brush strokes wrote the texture directly, the CPU buffer
///   must be refreshed by a dirty-region sync before it is read.
pub struct Layer {
    id: LayerId,
    pub name: String,
    pub visible: bool,
    /// 0.0 – 1.0, clamped when compositing.
    pub opacity: f32,
    pub blend_mode: BlendMode,
    /// Layer-local → world, in supersampled pixels.
    pub model: Mat4,
    pixels: RgbaImage,
    cpu_dirty: bool,
    gpu_ahead: bool,
}

impl Layer {
    /// A fully transparent layer.
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self::from_pixels(name, RgbaImage::new(width.max(1), height.max(1)))
    }

    pub fn new_filled(name: impl Into<String>, width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self::from_pixels(name, RgbaImage::from_pixel(width.max(1), height.max(1), color))
    }

    pub fn from_pixels(name: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            id: LayerId::next(),
            name: name.into(),
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            model: Mat4::IDENTITY,
            pixels,
            cpu_dirty: true,
            gpu_ahead: false,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Read access to the CPU buffer.  Only authoritative when
    /// [`Layer::needs_cpu_refresh`] is false.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Mutable access to the CPU buffer; schedules a full re-upload.
    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        self.cpu_dirty = true;
        &mut self.pixels
    }

    pub fn replace_pixels(&mut self, pixels: RgbaImage) {
        self.pixels = pixels;
        self.cpu_dirty = true;
    }

    /// CPU → GPU staleness.
    pub fn is_dirty(&self) -> bool {
        self.cpu_dirty
    }

    pub fn mark_dirty(&mut self) {
        self.cpu_dirty = true;
    }

    /// GPU → CPU staleness.
    pub fn needs_cpu_refresh(&self) -> bool {
        self.gpu_ahead
    }

    pub(crate) fn mark_uploaded(&mut self) {
        self.cpu_dirty = false;
        self.gpu_ahead = false;
    }

    pub(crate) fn mark_gpu_written(&mut self) {
        self.gpu_ahead = true;
    }

    pub(crate) fn mark_cpu_synced(&mut self) {
        self.gpu_ahead = false;
    }

    /// Raw write access for the GPU → CPU sync; does not touch `cpu_dirty`.
    pub(crate) fn pixels_for_sync(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    /// Visible and not fully transparent.
    pub fn is_drawable(&self) -> bool {
        self.visible && self.opacity > 0.0
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|p| p[3] == 0)
    }

    /// Resize the canvas of this layer, keeping the top-left content.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if width == self.width() && height == self.height() {
            return;
        }
        let mut resized = RgbaImage::new(width, height);
        let copy_w = width.min(self.width());
        let copy_h = height.min(self.height());
        for y in 0..copy_h {
            for x in 0..copy_w {
                resized.put_pixel(x, y, *self.pixels.get_pixel(x, y));
            }
        }
        self.pixels = resized;
        self.cpu_dirty = true;
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    /// Capture the persistent state.  Refuses while the GPU holds strokes the
    /// CPU buffer has not seen yet.
    pub fn snapshot(&self) -> EngineResult<LayerSnapshot> {
        if self.gpu_ahead {
            return Err(EngineError::StaleCpuBuffer(self.id));
        }
        Ok(LayerSnapshot {
            width: self.width(),
            height: self.height(),
            pixels: self.pixels.as_raw().clone(),
            model: self.model,
        })
    }

    /// Restore from a snapshot.  The GPU texture is rebuilt on next use.
    pub fn restore(&mut self, snapshot: &LayerSnapshot) -> EngineResult<()> {
        let pixels = RgbaImage::from_raw(snapshot.width, snapshot.height, snapshot.pixels.clone())
            .ok_or_else(|| {
                EngineError::config(format!(
                    "snapshot holds {} bytes, expected {} for {}×{}",
                    snapshot.pixels.len(),
                    snapshot.width as usize * snapshot.height as usize * 4,
                    snapshot.width,
                    snapshot.height
                ))
            })?;
        self.pixels = pixels;
        self.model = snapshot.model;
        self.cpu_dirty = true;
        self.gpu_ahead = false;
        Ok(())
    }
}

/// The fields of a layer that round-trip through undo history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub width: u32,
    pub height: u32,
    /// RGBA8, straight alpha, row-major, top-down.
    pub pixels: Vec<u8>,
    pub model: Mat4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Layer::new("a", 4, 4);
        let b = Layer::new("b", 4, 4);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn blend_mode_u8_round_trip_and_fallback() {
        for mode in BlendMode::all() {
            assert_eq!(BlendMode::from_u8(mode.to_u8()), *mode);
        }
        assert_eq!(BlendMode::from_u8(200), BlendMode::Normal);
    }

    #[test]
    fn new_layer_needs_upload_and_pixels_mut_marks_dirty() {
        let mut layer = Layer::new("l", 8, 8);
        assert!(layer.is_dirty());
        layer.mark_uploaded();
        assert!(!layer.is_dirty());
        layer.pixels_mut().put_pixel(1, 1, Rgba([1, 2, 3, 4]));
        assert!(layer.is_dirty());
    }

    #[test]
    fn snapshot_refused_while_gpu_is_ahead() {
        let mut layer = Layer::new("l", 2, 2);
        layer.mark_gpu_written();
        assert!(matches!(layer.snapshot(), Err(EngineError::StaleCpuBuffer(_))));
        layer.mark_cpu_synced();
        assert!(layer.snapshot().is_ok());
    }

    #[test]
    fn restore_round_trips_pixels_and_model() {
        let mut layer = Layer::new_filled("l", 3, 2, Rgba([9, 8, 7, 255]));
        layer.model = Mat4::translation(4.0, 2.0);
        let snap = layer.snapshot().unwrap();

        let mut other = Layer::new("o", 1, 1);
        other.mark_uploaded();
        other.restore(&snap).unwrap();
        assert_eq!(other.pixels().as_raw(), layer.pixels().as_raw());
        assert_eq!(other.model, layer.model);
        assert!(other.is_dirty());
    }

    #[test]
    fn restore_rejects_wrong_length() {
        let snap = LayerSnapshot {
            width: 4,
            height: 4,
            pixels: vec![0; 3],
            model: Mat4::IDENTITY,
        };
        assert!(Layer::new("l", 1, 1).restore(&snap).is_err());
    }

    #[test]
    fn resize_keeps_top_left() {
        let mut layer = Layer::new_filled("l", 4, 4, Rgba([255, 0, 0, 255]));
        layer.mark_uploaded();
        layer.resize(6, 2);
        assert_eq!(layer.width(), 6);
        assert_eq!(layer.height(), 2);
        assert_eq!(layer.pixels().get_pixel(3, 1)[0], 255);
        assert_eq!(layer.pixels().get_pixel(5, 1)[3], 0);
        assert!(layer.is_dirty());
    }
}
