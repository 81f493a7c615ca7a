use image::Rgba32FImage;

use crate::backend::Readback;
use crate::coords::{storage_origin, storage_row, RowOrder};
use crate::dirty::PixelRect;
use crate::error::{EngineError, EngineResult};
use crate::resample::quantize;

/// Rows are stored bottom-up, like a GL framebuffer.
pub const SURFACE_ROW_ORDER: RowOrder = RowOrder::BottomUp;

/// A float RGBA render target holding premultiplied texels.
pub struct Surface {
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

impl Surface {
    /// Cleared to transparent.  Fails with `Allocation` when either edge is
    /// zero or above `max_dimension`, or when memory cannot be reserved.
    pub fn try_new(width: u32, height: u32, max_dimension: u32) -> EngineResult<Self> {
        if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
            return Err(EngineError::allocation(format!(
                "surface {width}×{height} outside 1..={max_dimension}"
            )));
        }
        let len = width as usize * height as usize;
        let mut texels = Vec::new();
        texels
            .try_reserve_exact(len)
            .map_err(|e| EngineError::allocation(format!("surface {width}×{height}: {e}")))?;
        texels.resize(len, [0.0; 4]);
        Ok(Self { width, height, texels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::full(self.width, self.height)
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        storage_row(y, self.height, SURFACE_ROW_ORDER) as usize * self.width as usize + x as usize
    }

    /// Texel at top-down `(x, y)`, clamped to the edge.
    #[inline]
    pub fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.texels[self.index(x, y)]
    }

    /// Bilinear sample at a top-down texel-space position (texel centres at
    /// `i + 0.5`), clamp-to-edge.
    pub fn sample(&self, p: [f32; 2]) -> [f32; 4] {
        let fx = p[0] - 0.5;
        let fy = p[1] - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);
        let a = self.texel(x0, y0);
        let b = self.texel(x0 + 1, y0);
        let c = self.texel(x0, y0 + 1);
        let d = self.texel(x0 + 1, y0 + 1);
        let mut out = [0.0; 4];
        for i in 0..4 {
            let top = a[i] + (b[i] - a[i]) * tx;
            let bottom = c[i] + (d[i] - c[i]) * tx;
            out[i] = top + (bottom - top) * ty;
        }
        out
    }

    /// Clear a top-down region to transparent.
    pub fn clear(&mut self, rect: PixelRect) {
        let Some(rect) = rect.intersect(&self.bounds()) else {
            return;
        };
        for y in rect.y..rect.bottom() {
            let start = self.index(rect.x, y);
            self.texels[start..start + rect.width as usize].fill([0.0; 4]);
        }
    }

    /// Overwrite every texel from a top-down image of the same size.
    pub fn upload(&mut self, pixels: &Rgba32FImage) -> EngineResult<()> {
        if pixels.dimensions() != self.size() {
            return Err(EngineError::allocation(format!(
                "upload of {}×{} into {}×{} surface",
                pixels.width(),
                pixels.height(),
                self.width,
                self.height
            )));
        }
        for (x, y, p) in pixels.enumerate_pixels() {
            let i = self.index(x, y);
            self.texels[i] = p.0;
        }
        Ok(())
    }

    /// Raw storage, bottom-up rows of `width` texels.
    pub fn texels_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.texels
    }

    /// GL-style pixel read: rows come back in storage (bottom-up) order.
    pub fn read(&self, rect: PixelRect) -> Readback {
        let Some(rect) = rect.intersect(&self.bounds()) else {
            return Readback {
                width: 0,
                height: 0,
                data: Vec::new(),
                row_order: SURFACE_ROW_ORDER,
            };
        };
        let first = storage_origin(rect.y, rect.height, self.height, SURFACE_ROW_ORDER) as usize;
        let mut data = Vec::with_capacity(rect.area() as usize * 4);
        for row in first..first + rect.height as usize {
            let start = row * self.width as usize + rect.x as usize;
            for texel in &self.texels[start..start + rect.width as usize] {
                data.extend_from_slice(&quantize(*texel));
            }
        }
        Readback {
            width: rect.width,
            height: rect.height,
            data,
            row_order: SURFACE_ROW_ORDER,
        }
    }
}
