// ============================================================================
// RESAMPLING — premultiply + upsample on upload, box-downsample on readback
// ============================================================================
//
// Both directions work on premultiplied values so that transparent pixels
// never bleed their (meaningless) colour into visible neighbours.
//
// Base pixel `x` owns the supersampled texels whose centres fall inside
// `[x·ss, (x+1)·ss)`.  The upsample keeps the mean of every owned block
// equal to its source pixel and the downsample averages that same block, so
// upload followed by readback returns the buffer up to 8-bit rounding.
// ============================================================================

use image::{Rgba, Rgba32FImage, RgbaImage};
use rayon::prelude::*;

use crate::dirty::PixelRect;

/// First supersampled texel owned by base pixel `x`.
#[inline]
fn texel_start(x: u32, ss: f32) -> u32 {
    (x as f32 * ss - 0.5).ceil().max(0.0) as u32
}

/// Supersampled texels `[start, end)` owned by base pixel `x` along one axis.
#[inline]
pub fn texel_span(x: u32, ss: f32) -> (u32, u32) {
    (texel_start(x, ss), texel_start(x + 1, ss))
}

/// Straight RGBA8 → premultiplied float at `width × height` supersampled
/// texels.
///
/// Each block starts as its source pixel and takes as much of the bilinear
/// detail as fits without leaving `[0, a]` premultiplied range, with the
/// detail's block mean removed.  Smooth areas upsample smoothly, hard edges
/// stay hard and every block still averages to its source pixel.  Texels
/// past the last block (ceil padding) stay transparent.
pub fn upsample_premultiplied(src: &RgbaImage, width: u32, height: u32, ss: f32) -> Rgba32FImage {
    let (sw, sh) = src.dimensions();
    let premul: Vec<[f32; 4]> = src.pixels().map(|p| premultiply(p).0).collect();
    let mut out = Rgba32FImage::new(width, height);
    if sw == 0 || sh == 0 {
        return out;
    }

    let cols: Vec<(u32, u32)> = (0..sw).map(|x| clamp_span(texel_span(x, ss), width)).collect();
    let row_stride = width as usize * 4;

    // One base row fills a contiguous band of texel rows.
    let bands: Vec<(u32, Vec<f32>)> = (0..sh)
        .into_par_iter()
        .map(|y| {
            let (r0, r1) = clamp_span(texel_span(y, ss), height);
            let mut band = vec![0.0f32; (r1 - r0) as usize * row_stride];
            for (x, &(c0, c1)) in cols.iter().enumerate() {
                let source = premul[y as usize * sw as usize + x];
                fill_block(&mut band, row_stride, (r0, r1), (c0, c1), source, |tx, ty| {
                    let u = (tx as f32 + 0.5) / ss - 0.5;
                    let v = (ty as f32 + 0.5) / ss - 0.5;
                    sample_bilinear(&premul, sw, sh, u, v)
                });
            }
            (r0, band)
        })
        .collect();

    let texels: &mut [f32] = &mut out;
    for (r0, band) in bands {
        let start = r0 as usize * row_stride;
        texels[start..start + band.len()].copy_from_slice(&band);
    }
    out
}

#[inline]
fn clamp_span((start, end): (u32, u32), limit: u32) -> (u32, u32) {
    (start.min(limit), end.min(limit))
}

/// Write one owned block: `source` plus the largest fraction of the
/// zero-mean bilinear detail that keeps every texel premultiplied-valid.
fn fill_block(
    band: &mut [f32],
    row_stride: usize,
    (r0, r1): (u32, u32),
    (c0, c1): (u32, u32),
    source: [f32; 4],
    bilinear: impl Fn(u32, u32) -> [f32; 4],
) {
    let count = ((r1 - r0) * (c1 - c0)) as usize;
    if count == 0 {
        return;
    }
    let mut samples = Vec::with_capacity(count);
    let mut mean = [0.0f32; 4];
    for ty in r0..r1 {
        for tx in c0..c1 {
            let b = bilinear(tx, ty);
            for c in 0..4 {
                mean[c] += b[c] / count as f32;
            }
            samples.push(b);
        }
    }

    let mut lambda = 1.0f32;
    for b in &samples {
        let d: [f32; 4] = std::array::from_fn(|c| b[c] - mean[c]);
        let mut limit = |f0: f32, f1: f32| {
            if f1 < 0.0 {
                lambda = lambda.min(f0.max(0.0) / -f1);
            }
        };
        limit(source[3], d[3]);
        limit(1.0 - source[3], -d[3]);
        for c in 0..3 {
            limit(source[c], d[c]);
            limit(source[3] - source[c], d[3] - d[c]);
        }
    }

    let mut i = 0;
    for ty in r0..r1 {
        let row = (ty - r0) as usize * row_stride;
        for tx in c0..c1 {
            let b = samples[i];
            let at = row + tx as usize * 4;
            for c in 0..4 {
                band[at + c] = source[c] + lambda * (b[c] - mean[c]);
            }
            i += 1;
        }
    }
}

/// Bilinear sample of a premultiplied buffer, clamped at the edges.
#[inline]
fn sample_bilinear(pixels: &[[f32; 4]], w: u32, h: u32, fx: f32, fy: f32) -> [f32; 4] {
    let x0 = fx.floor() as i32;
    let y0 = fy.floor() as i32;
    let dx = fx - x0 as f32;
    let dy = fy - y0 as f32;
    let at = |x: i32, y: i32| {
        let cx = x.clamp(0, w as i32 - 1) as usize;
        let cy = y.clamp(0, h as i32 - 1) as usize;
        pixels[cy * w as usize + cx]
    };
    let (p00, p10, p01, p11) = (at(x0, y0), at(x0 + 1, y0), at(x0, y0 + 1), at(x0 + 1, y0 + 1));
    std::array::from_fn(|c| {
        p00[c] * (1.0 - dx) * (1.0 - dy) + p10[c] * dx * (1.0 - dy) + p01[c] * (1.0 - dx) * dy + p11[c] * dx * dy
    })
}

#[inline]
pub fn premultiply(p: &Rgba<u8>) -> Rgba<f32> {
    let a = p[3] as f32 / 255.0;
    Rgba([
        p[0] as f32 / 255.0 * a,
        p[1] as f32 / 255.0 * a,
        p[2] as f32 / 255.0 * a,
        a,
    ])
}

/// Premultiplied float (0‥1) → straight RGBA8.  Colour is only divided where
/// alpha is non-zero.
#[inline]
pub fn unpremultiply(p: [f32; 4]) -> Rgba<u8> {
    let a = p[3].clamp(0.0, 1.0);
    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    if a > 0.0 {
        Rgba([to_u8(p[0] / a), to_u8(p[1] / a), to_u8(p[2] / a), to_u8(a)])
    } else {
        Rgba([to_u8(p[0]), to_u8(p[1]), to_u8(p[2]), 0])
    }
}

/// Premultiplied RGBA8, top-down, tightly packed → straight `RgbaImage`.
pub fn unpremultiply_to_image(data: &[u8], width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let i = (y as usize * width as usize + x as usize) * 4;
        unpremultiply([
            data[i] as f32 / 255.0,
            data[i + 1] as f32 / 255.0,
            data[i + 2] as f32 / 255.0,
            data[i + 3] as f32 / 255.0,
        ])
    })
}

/// Supersampled texels owned by `dest` (base pixels), clamped to the
/// texture.
pub fn supersampled_rect(dest: PixelRect, ss: f32, tex_w: u32, tex_h: u32) -> Option<PixelRect> {
    let x0 = texel_start(dest.x, ss).min(tex_w);
    let y0 = texel_start(dest.y, ss).min(tex_h);
    let x1 = texel_start(dest.right(), ss).min(tex_w);
    let y1 = texel_start(dest.bottom(), ss).min(tex_h);
    (x0 < x1 && y0 < y1).then(|| PixelRect::new(x0, y0, x1 - x0, y1 - y0))
}

/// Box downsample of a premultiplied, top-down readback of `src_rect`
/// (supersampled pixels) into `dest` (base pixels) of `target`,
/// un-premultiplying on the way out.  Every destination pixel is the mean of
/// the texels it owns.
pub fn downsample_into(
    readback: &[u8],
    src_rect: PixelRect,
    ss: f32,
    target: &mut RgbaImage,
    dest: PixelRect,
) {
    let (tw, th) = target.dimensions();
    let row0 = dest.y.min(th);
    let row1 = dest.bottom().min(th);
    let col1 = dest.right().min(tw);
    if row0 >= row1 || dest.x >= col1 {
        return;
    }
    let stride = src_rect.width as usize * 4;
    // Owned span of a base coordinate, relative to the readback origin.
    let local = |x: u32, origin: u32, extent: u32| {
        let (s, e) = texel_span(x, ss);
        let lo = s.max(origin).min(origin + extent) - origin;
        let hi = e.max(origin).min(origin + extent) - origin;
        (lo, hi)
    };

    let row_bytes = tw as usize * 4;
    let buffer: &mut [u8] = target;
    buffer
        .par_chunks_mut(row_bytes)
        .enumerate()
        .skip(row0 as usize)
        .take((row1 - row0) as usize)
        .for_each(|(dy, row)| {
            let (sy0, sy1) = local(dy as u32, src_rect.y, src_rect.height);
            for dx in dest.x..col1 {
                let (sx0, sx1) = local(dx, src_rect.x, src_rect.width);
                let count = (sy1 - sy0) * (sx1 - sx0);
                if count == 0 {
                    continue;
                }
                let mut acc = [0u32; 4];
                for sy in sy0..sy1 {
                    for sx in sx0..sx1 {
                        let i = sy as usize * stride + sx as usize * 4;
                        for c in 0..4 {
                            acc[c] += readback[i + c] as u32;
                        }
                    }
                }
                let mean = acc.map(|v| v as f32 / count as f32 / 255.0);
                let at = dx as usize * 4;
                row[at..at + 4].copy_from_slice(&unpremultiply(mean).0);
            }
        });
}

/// Premultiplied float → RGBA8 bytes (still premultiplied).
#[inline]
pub fn quantize(p: [f32; 4]) -> [u8; 4] {
    p.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Upload-then-readback through 8-bit texels, as a backend would.
    fn round_trip(src: &RgbaImage, ss: f32) -> RgbaImage {
        let w = (src.width() as f32 * ss).ceil() as u32;
        let h = (src.height() as f32 * ss).ceil() as u32;
        let up = upsample_premultiplied(src, w, h, ss);
        let bytes: Vec<u8> = up.pixels().flat_map(|p| quantize(p.0)).collect();
        let mut out = RgbaImage::new(src.width(), src.height());
        let full = PixelRect::full(src.width(), src.height());
        downsample_into(&bytes, PixelRect::full(w, h), ss, &mut out, full);
        out
    }

    fn max_diff(a: &RgbaImage, b: &RgbaImage) -> u8 {
        a.as_raw().iter().zip(b.as_raw()).map(|(p, q)| p.abs_diff(*q)).max().unwrap_or(0)
    }

    #[test]
    fn premultiply_then_unpremultiply_is_stable_for_opaque_and_clear() {
        let opaque = Rgba([200, 100, 50, 255]);
        let p = premultiply(&opaque);
        assert_eq!(unpremultiply(p.0), opaque);
        let clear = premultiply(&Rgba([200, 100, 50, 0]));
        assert_eq!(unpremultiply(clear.0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn texel_spans_tile_the_axis() {
        for ss in [1.0, 1.5, 2.0, 2.5, 3.0, 4.0] {
            let mut next = 0;
            for x in 0..9 {
                let (s, e) = texel_span(x, ss);
                assert_eq!(s, next, "gap before pixel {x} at ss {ss}");
                assert!(e > s, "pixel {x} owns no texel at ss {ss}");
                next = e;
            }
            assert!(next <= (9.0 * ss).ceil() as u32);
        }
        assert_eq!(texel_span(0, 1.5), (0, 1));
        assert_eq!(texel_span(1, 1.5), (1, 3));
    }

    #[test]
    fn upsample_keeps_flat_colour() {
        let src = RgbaImage::from_pixel(3, 2, Rgba([255, 0, 0, 255]));
        let up = upsample_premultiplied(&src, 6, 4, 2.0);
        assert_eq!(up.dimensions(), (6, 4));
        for p in up.pixels() {
            assert!((p[0] - 1.0).abs() < 1e-5 && p[1].abs() < 1e-5 && (p[3] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn upsample_pads_ceil_extent_with_transparency() {
        let src = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 255, 255]));
        // 3 × 1.5 = 4.5 → 5 texels; the last column and row are padding.
        let up = upsample_premultiplied(&src, 5, 5, 1.5);
        assert_eq!(up.get_pixel(4, 0)[3], 0.0);
        assert_eq!(up.get_pixel(0, 4)[3], 0.0);
        assert!((up.get_pixel(3, 3)[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn upsample_is_smooth_inside_gradients() {
        let src = RgbaImage::from_fn(4, 1, |x, _| Rgba([x as u8 * 60, 0, 0, 255]));
        let up = upsample_premultiplied(&src, 8, 2, 2.0);
        // The two texels of an interior block differ instead of repeating.
        let (a, b) = (up.get_pixel(2, 0)[0], up.get_pixel(3, 0)[0]);
        assert!(b > a, "{a} vs {b}");
        assert!(((a + b) / 2.0 - 60.0 / 255.0).abs() < 1e-5);
    }

    #[test]
    fn hard_edge_round_trips_at_integer_and_fractional_factors() {
        let src = RgbaImage::from_fn(16, 16, |x, _| {
            if x < 8 { Rgba([255, 255, 255, 255]) } else { Rgba([0, 0, 0, 255]) }
        });
        for ss in [1.0, 1.5, 2.0, 3.0] {
            assert!(max_diff(&src, &round_trip(&src, ss)) <= 2, "ss {ss}");
        }
    }

    #[test]
    fn gradient_and_checker_round_trip_at_fractional_factor() {
        let gradient = RgbaImage::from_fn(5, 5, |x, y| Rgba([(x * 60) as u8, (y * 60) as u8, 90, 255]));
        assert!(max_diff(&gradient, &round_trip(&gradient, 1.5)) <= 2);

        let checker = RgbaImage::from_fn(7, 5, |x, y| {
            if (x + y) % 2 == 0 { Rgba([230, 20, 40, 255]) } else { Rgba([10, 200, 90, 128]) }
        });
        assert!(max_diff(&checker, &round_trip(&checker, 2.5)) <= 2);
    }

    #[test]
    fn repeated_round_trips_do_not_drift() {
        let src = RgbaImage::from_fn(12, 6, |x, y| {
            if x < 6 { Rgba([255, 255, 255, 255]) } else { Rgba([(y * 40) as u8, 30, 0, 255]) }
        });
        let mut current = src.clone();
        for _ in 0..5 {
            current = round_trip(&current, 2.0);
        }
        assert!(max_diff(&src, &current) <= 2);
    }

    #[test]
    fn downsample_averages_blocks() {
        // 2×2 supersampled block: two opaque white, two transparent.
        let readback = [255u8, 255, 255, 255, 0, 0, 0, 0, 255, 255, 255, 255, 0, 0, 0, 0];
        let mut target = RgbaImage::new(1, 1);
        downsample_into(&readback, PixelRect::new(0, 0, 2, 2), 2.0, &mut target, PixelRect::new(0, 0, 1, 1));
        // Half coverage of white stays white in straight alpha.
        assert_eq!(target.get_pixel(0, 0), &Rgba([255, 255, 255, 128]));
    }

    #[test]
    fn downsample_handles_fractional_factor() {
        let readback = vec![255u8; 3 * 3 * 4];
        let mut target = RgbaImage::new(2, 2);
        downsample_into(&readback, PixelRect::new(0, 0, 3, 3), 1.5, &mut target, PixelRect::new(0, 0, 2, 2));
        assert!(target.pixels().all(|p| p == &Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn downsample_writes_only_the_destination_rect() {
        let readback = vec![255u8; 4 * 4 * 4];
        let mut target = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 4]));
        downsample_into(&readback, PixelRect::new(2, 2, 4, 4), 2.0, &mut target, PixelRect::new(1, 1, 2, 2));
        assert_eq!(target.get_pixel(1, 1), &Rgba([255, 255, 255, 255]));
        assert_eq!(target.get_pixel(2, 2), &Rgba([255, 255, 255, 255]));
        assert_eq!(target.get_pixel(0, 0), &Rgba([1, 2, 3, 4]));
        assert_eq!(target.get_pixel(3, 1), &Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn supersampled_rect_is_clamped() {
        let r = supersampled_rect(PixelRect::new(3, 4, 10, 10), 2.0, 20, 20).unwrap();
        assert_eq!(r, PixelRect::new(6, 8, 14, 12));
        assert!(supersampled_rect(PixelRect::new(30, 0, 1, 1), 2.0, 20, 20).is_none());
    }

    #[test]
    fn unpremultiply_to_image_divides_colour() {
        let data = [255u8, 128, 0, 255, 0, 0, 0, 0];
        let img = unpremultiply_to_image(&data, 2, 1);
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 128, 0, 255]));
        assert_eq!(img.get_pixel(1, 0), &Rgba([0, 0, 0, 0]));
    }
}
