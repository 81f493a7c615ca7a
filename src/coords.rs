// ============================================================================
// COORDINATES — the one place that knows about Y direction
// ============================================================================
//
// Convention: Y grows downward in every space the crate exposes (CPU pixel
// buffers, world/canvas space, layer-local space, supersampled space).  The
// only conversion to an upward Y happens in `projection()`, which maps pixel
// space into clip space.  Framebuffer row order is a property of the backend
// (`RowOrder`) and is converted here and nowhere else.
// ============================================================================

use std::ops::Mul;

use serde::{Deserialize, Serialize};

/// Column-major 4×4 matrix, laid out like a WGSL `mat4x4<f32>`:
/// `cols[c][r]`.  Translation lives in `cols[3]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mat4 {
    pub cols: [[f32; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4 {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn from_cols(cols: [[f32; 4]; 4]) -> Self {
        Self { cols }
    }

    pub fn translation(tx: f32, ty: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[3][0] = tx;
        m.cols[3][1] = ty;
        m
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[0][0] = sx;
        m.cols[1][1] = sy;
        m
    }

    /// Rotation about the origin.  With Y pointing down a positive angle turns
    /// clockwise on screen.
    pub fn rotation(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        let mut m = Self::IDENTITY;
        m.cols[0][0] = c;
        m.cols[0][1] = s;
        m.cols[1][0] = -s;
        m.cols[1][1] = c;
        m
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> f32 {
        self.cols[col][row]
    }

    /// Transform a 2D point (z = 0, w = 1), returning the perspective-divided
    /// x/y.
    pub fn transform_point(&self, p: [f32; 2]) -> [f32; 2] {
        let x = self.at(0, 0) * p[0] + self.at(0, 1) * p[1] + self.at(0, 3);
        let y = self.at(1, 0) * p[0] + self.at(1, 1) * p[1] + self.at(1, 3);
        let w = self.at(3, 0) * p[0] + self.at(3, 1) * p[1] + self.at(3, 3);
        if w != 0.0 && w != 1.0 {
            [x / w, y / w]
        } else {
            [x, y]
        }
    }

    /// Area scale of the XY part, as a linear factor.
    pub fn linear_scale(&self) -> f32 {
        let det = self.at(0, 0) * self.at(1, 1) - self.at(0, 1) * self.at(1, 0);
        det.abs().sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }

    /// Full 4×4 inverse by cofactor expansion.  `None` when singular.
    pub fn inverse(&self) -> Option<Mat4> {
        let m: [f32; 16] = bytemuck::cast(self.cols);
        let mut inv = [0.0f32; 16];

        inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
            + m[9] * m[7] * m[14]
            + m[13] * m[6] * m[11]
            - m[13] * m[7] * m[10];
        inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
            - m[8] * m[7] * m[14]
            - m[12] * m[6] * m[11]
            + m[12] * m[7] * m[10];
        inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
            + m[8] * m[7] * m[13]
            + m[12] * m[5] * m[11]
            - m[12] * m[7] * m[9];
        inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
            - m[8] * m[6] * m[13]
            - m[12] * m[5] * m[10]
            + m[12] * m[6] * m[9];
        inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
            - m[9] * m[3] * m[14]
            - m[13] * m[2] * m[11]
            + m[13] * m[3] * m[10];
        inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
            + m[8] * m[3] * m[14]
            + m[12] * m[2] * m[11]
            - m[12] * m[3] * m[10];
        inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
            - m[8] * m[3] * m[13]
            - m[12] * m[1] * m[11]
            + m[12] * m[3] * m[9];
        inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
            + m[8] * m[2] * m[13]
            + m[12] * m[1] * m[10]
            - m[12] * m[2] * m[9];
        inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
            + m[5] * m[3] * m[14]
            + m[13] * m[2] * m[7]
            - m[13] * m[3] * m[6];
        inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
            - m[4] * m[3] * m[14]
            - m[12] * m[2] * m[7]
            + m[12] * m[3] * m[6];
        inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
            + m[4] * m[3] * m[13]
            + m[12] * m[1] * m[7]
            - m[12] * m[3] * m[5];
        inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
            - m[4] * m[2] * m[13]
            - m[12] * m[1] * m[6]
            + m[12] * m[2] * m[5];
        inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
            - m[5] * m[3] * m[10]
            - m[9] * m[2] * m[7]
            + m[9] * m[3] * m[6];
        inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
            + m[4] * m[3] * m[10]
            + m[8] * m[2] * m[7]
            - m[8] * m[3] * m[6];
        inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
            - m[4] * m[3] * m[9]
            - m[8] * m[1] * m[7]
            + m[8] * m[3] * m[5];
        inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
            + m[4] * m[2] * m[9]
            + m[8] * m[1] * m[6]
            - m[8] * m[2] * m[5];

        let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        for v in inv.iter_mut() {
            *v *= inv_det;
        }
        Some(Mat4 {
            cols: bytemuck::cast(inv),
        })
    }
}

impl Mul for Mat4 {
    type Output = Mat4;

    fn mul(self, rhs: Mat4) -> Mat4 {
        let mut out = [[0.0f32; 4]; 4];
        for (c, col) in out.iter_mut().enumerate() {
            for (r, cell) in col.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.at(r, k) * rhs.at(k, c)).sum();
            }
        }
        Mat4 { cols: out }
    }
}

/// Pixel space (origin top-left, Y down) → clip space (Y up).
///
/// This is the only Y flip in the crate.  Both backends, both programs and
/// every draw use this matrix.
pub fn projection(width: f32, height: f32) -> Mat4 {
    Mat4::from_cols([
        [2.0 / width, 0.0, 0.0, 0.0],
        [0.0, -2.0 / height, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [-1.0, 1.0, 0.0, 1.0],
    ])
}

/// Base canvas coordinates → supersampled pixel space.
#[inline]
pub fn to_supersampled(p: [f32; 2], ss: f32) -> [f32; 2] {
    [p[0] * ss, p[1] * ss]
}

/// Size of a supersampled target for a base size.
#[inline]
pub fn supersampled_extent(base: u32, ss: f32) -> u32 {
    ((base as f32 * ss).ceil() as u32).max(1)
}

/// World point in base coordinates → layer-local supersampled pixels.
pub fn world_to_local(model_inverse: &Mat4, world_base: [f32; 2], ss: f32) -> [f32; 2] {
    model_inverse.transform_point(to_supersampled(world_base, ss))
}

// ============================================================================
// FRAMEBUFFER ROW ORDER
// ============================================================================

/// Row order of a framebuffer's storage and of what a pixel read returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowOrder {
    /// Row 0 is the top of the image (CPU buffers, wgpu).
    TopDown,
    /// Row 0 is the bottom of the image (GL-style window coordinates).
    BottomUp,
}

/// Clip space → window coordinates for a target of `width × height`.
/// Returned `y` counts rows in `order`.
pub fn ndc_to_window(ndc: [f32; 2], width: f32, height: f32, order: RowOrder) -> [f32; 2] {
    let x = (ndc[0] + 1.0) * 0.5 * width;
    let y = match order {
        RowOrder::BottomUp => (ndc[1] + 1.0) * 0.5 * height,
        RowOrder::TopDown => (1.0 - ndc[1]) * 0.5 * height,
    };
    [x, y]
}

/// Inverse of [`ndc_to_window`].
pub fn window_to_ndc(win: [f32; 2], width: f32, height: f32, order: RowOrder) -> [f32; 2] {
    let x = win[0] / width * 2.0 - 1.0;
    let y = match order {
        RowOrder::BottomUp => win[1] / height * 2.0 - 1.0,
        RowOrder::TopDown => 1.0 - win[1] / height * 2.0,
    };
    [x, y]
}

/// Storage row holding top-down row `y` of a target `height` rows tall.
#[inline]
pub fn storage_row(y: u32, height: u32, order: RowOrder) -> u32 {
    match order {
        RowOrder::TopDown => y,
        RowOrder::BottomUp => height - 1 - y,
    }
}

/// First storage row of a top-down span `[y, y + rows)`.  This is the origin
/// a GL-style pixel read expects.
#[inline]
pub fn storage_origin(y: u32, rows: u32, height: u32, order: RowOrder) -> u32 {
    match order {
        RowOrder::TopDown => y,
        RowOrder::BottomUp => height - (y + rows),
    }
}

/// Reverse the rows of a tightly packed RGBA8 buffer in place.
pub fn flip_rows(data: &mut [u8], width: u32, height: u32) {
    let stride = width as usize * 4;
    let rows = height as usize;
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        let (upper, lower) = data.split_at_mut(bottom * stride);
        upper[top * stride..(top + 1) * stride].swap_with_slice(&mut lower[..stride]);
    }
}

/// Bring a readback into top-down order.
pub fn to_top_down(data: &mut [u8], width: u32, height: u32, order: RowOrder) {
    if order == RowOrder::BottomUp {
        flip_rows(data, width, height);
    }
}
