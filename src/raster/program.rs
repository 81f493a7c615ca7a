// ============================================================================
// FRAGMENT PROGRAMS — CPU versions of the two WGSL entry points
// ============================================================================

use crate::backend::PresentFilter;
use crate::brush::StampParams;

use super::surface::Surface;

/// Soft circle.  `None` where coverage is zero (the GPU version discards).
#[inline]
pub fn brush_fragment(stamp: &StampParams, p: [f32; 2]) -> Option<[f32; 4]> {
    let coverage = stamp.coverage(p);
    if coverage <= 0.0 {
        return None;
    }
    Some(stamp.color.map(|c| c * coverage))
}

const BOX_OFFSETS: [[f32; 2]; 4] = [[-0.25, -0.25], [0.25, -0.25], [-0.25, 0.25], [0.25, 0.25]];
const RING_OFFSETS: [[f32; 2]; 4] = [[-0.75, -0.75], [0.75, -0.75], [-0.75, 0.75], [0.75, 0.75]];

fn taps(src: &Surface, p: [f32; 2], offsets: &[[f32; 2]; 4]) -> [f32; 4] {
    let mut acc = [0.0f32; 4];
    for o in offsets {
        let s = src.sample([p[0] + o[0], p[1] + o[1]]);
        for c in 0..4 {
            acc[c] += s[c];
        }
    }
    acc.map(|v| v * 0.25)
}

/// Textured quad.  `p` is in source texels; the result is premultiplied and
/// scaled by `opacity`.
pub fn compositor_fragment(src: &Surface, p: [f32; 2], opacity: f32, filter: PresentFilter) -> [f32; 4] {
    let color = match filter {
        PresentFilter::Direct => src.sample(p),
        PresentFilter::Box4 { sharpness } => {
            let soft = taps(src, p, &BOX_OFFSETS);
            if sharpness > 0.0 {
                let ring = taps(src, p, &RING_OFFSETS);
                let mut out = [0.0f32; 4];
                for c in 0..4 {
                    out[c] = soft[c] + sharpness * (soft[c] - ring[c]);
                }
                clamp_premultiplied(out)
            } else {
                soft
            }
        }
    };
    color.map(|c| c * opacity)
}

/// Alpha into 0‥1 and colour into 0‥alpha.
#[inline]
pub fn clamp_premultiplied(p: [f32; 4]) -> [f32; 4] {
    let a = p[3].clamp(0.0, 1.0);
    [p[0].clamp(0.0, a), p[1].clamp(0.0, a), p[2].clamp(0.0, a), a]
}
