// ============================================================================
// QUAD RASTERIZER — GL-style scan conversion of one transformed quad
// ============================================================================
//
// A draw call is a quad in some local pixel space, a model-view-projection
// matrix into clip space, a scissor box and a blend state.  Fragments are
// generated at window-pixel centres; each centre is taken back through the
// inverse MVP to find the local position the fragment program sees.
// ============================================================================

use rayon::prelude::*;

use crate::coords::{ndc_to_window, storage_origin, window_to_ndc, Mat4};
use crate::dirty::PixelRect;

use super::blend::BlendState;
use super::surface::{Surface, SURFACE_ROW_ORDER};

/// Axis-aligned quad in local pixels.
#[derive(Clone, Copy, Debug)]
pub struct Quad {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl Quad {
    pub fn new(min: [f32; 2], max: [f32; 2]) -> Self {
        Self { min, max }
    }

    pub fn around(center: [f32; 2], half_extent: f32) -> Self {
        Self::new(
            [center[0] - half_extent, center[1] - half_extent],
            [center[0] + half_extent, center[1] + half_extent],
        )
    }

    fn corners(&self) -> [[f32; 2]; 4] {
        [
            self.min,
            [self.max[0], self.min[1]],
            [self.min[0], self.max[1]],
            self.max,
        ]
    }

    #[inline]
    fn contains(&self, p: [f32; 2]) -> bool {
        p[0] >= self.min[0] && p[0] < self.max[0] && p[1] >= self.min[1] && p[1] < self.max[1]
    }
}

/// Rasterize `quad` into `target`.  `scissor` is top-down pixels.  Storage
/// rows are shaded in parallel; each row only touches its own texels, so the
/// result does not depend on scheduling.
pub fn draw_quad<F>(target: &mut Surface, scissor: PixelRect, mvp: &Mat4, quad: Quad, blend: BlendState, shade: F)
where
    F: Fn([f32; 2]) -> Option<[f32; 4]> + Sync,
{
    let Some(inverse) = mvp.inverse() else {
        return;
    };
    let Some(scissor) = scissor.intersect(&target.bounds()) else {
        return;
    };
    let (w, h) = (target.width() as f32, target.height() as f32);

    let mut lo = [f32::INFINITY; 2];
    let mut hi = [f32::NEG_INFINITY; 2];
    for corner in quad.corners() {
        let win = ndc_to_window(mvp.transform_point(corner), w, h, SURFACE_ROW_ORDER);
        for i in 0..2 {
            lo[i] = lo[i].min(win[i]);
            hi[i] = hi[i].max(win[i]);
        }
    }
    if !(lo[0].is_finite() && lo[1].is_finite() && hi[0].is_finite() && hi[1].is_finite()) {
        return;
    }

    let scissor_row = storage_origin(scissor.y, scissor.height, target.height(), SURFACE_ROW_ORDER);
    let col0 = (lo[0].floor().max(0.0) as u32).max(scissor.x);
    let col1 = (hi[0].ceil().max(0.0) as u32).min(scissor.right());
    let row0 = (lo[1].floor().max(0.0) as u32).max(scissor_row);
    let row1 = (hi[1].ceil().max(0.0) as u32).min(scissor_row + scissor.height);
    if col0 >= col1 || row0 >= row1 {
        return;
    }

    let width = target.width() as usize;
    target
        .texels_mut()
        .par_chunks_mut(width)
        .enumerate()
        .skip(row0 as usize)
        .take((row1 - row0) as usize)
        .for_each(|(row, texels)| {
            let wy = row as f32 + 0.5;
            for col in col0..col1 {
                let ndc = window_to_ndc([col as f32 + 0.5, wy], w, h, SURFACE_ROW_ORDER);
                let local = inverse.transform_point(ndc);
                if !quad.contains(local) {
                    continue;
                }
                if let Some(src) = shade(local) {
                    let dst = &mut texels[col as usize];
                    *dst = blend.apply(src, *dst);
                }
            }
        });
}
