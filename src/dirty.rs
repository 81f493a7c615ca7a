// ============================================================================
// DIRTY RECTANGLES
// ============================================================================

/// Axis-aligned region in base (non-supersampled) canvas coordinates.
///
/// An unset rectangle uses the `{+inf, +inf, -inf, -inf}` sentinel so that
/// the first `include_*` call simply replaces it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirtyRect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Default for DirtyRect {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl DirtyRect {
    pub const EMPTY: DirtyRect = DirtyRect {
        min_x: f32::INFINITY,
        min_y: f32::INFINITY,
        max_x: f32::NEG_INFINITY,
        max_y: f32::NEG_INFINITY,
    };

    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// The whole canvas.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    /// Empty, inverted, or containing NaN.
    pub fn is_empty(&self) -> bool {
        !(self.min_x <= self.max_x && self.min_y <= self.max_y)
    }

    pub fn include_point(&mut self, x: f32, y: f32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Grow to cover a circle plus one pixel for the anti-aliased rim.
    pub fn include_circle(&mut self, cx: f32, cy: f32, radius: f32) {
        let r = radius.max(0.0) + 1.0;
        self.include_point(cx - r, cy - r);
        self.include_point(cx + r, cy + r);
    }

    pub fn union(&self, other: &DirtyRect) -> DirtyRect {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => *other,
            (_, true) => *self,
            _ => DirtyRect::new(
                self.min_x.min(other.min_x),
                self.min_y.min(other.min_y),
                self.max_x.max(other.max_x),
                self.max_y.max(other.max_y),
            ),
        }
    }

    pub fn scaled(&self, s: f32) -> DirtyRect {
        DirtyRect::new(self.min_x * s, self.min_y * s, self.max_x * s, self.max_y * s)
    }

    /// Integer pixel region covering this rect at `scale`, clamped to a
    /// `bounds_w × bounds_h` target.  `None` when nothing is left.
    pub fn to_pixel_rect(&self, scale: f32, bounds_w: u32, bounds_h: u32) -> Option<PixelRect> {
        if self.is_empty() || bounds_w == 0 || bounds_h == 0 {
            return None;
        }
        let s = self.scaled(scale);
        let x0 = s.min_x.floor().max(0.0);
        let y0 = s.min_y.floor().max(0.0);
        let mut x1 = s.max_x.ceil().min(bounds_w as f32);
        let mut y1 = s.max_y.ceil().min(bounds_h as f32);
        // A degenerate (point/line) rect still covers the pixel it sits in.
        if s.max_x.ceil() <= s.min_x.floor() {
            x1 = (x0 + 1.0).min(bounds_w as f32);
        }
        if s.max_y.ceil() <= s.min_y.floor() {
            y1 = (y0 + 1.0).min(bounds_h as f32);
        }
        if !(x0 < x1 && y0 < y1) {
            return None;
        }
        Some(PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// Integer pixel region, top-down, origin top-left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        (x0 < x1 && y0 < y1).then(|| PixelRect::new(x0, y0, x1 - x0, y1 - y0))
    }
}
