// ============================================================================
// BRUSH — stamp parameters, pressure curves, dense line stamping
// ============================================================================
//
// Lines are drawn as a dense run of round stamps rather than a stroked
// polyline, so width can follow pressure and caps are always round.  This
// module only produces stamp geometry; the backends rasterize it.
// ============================================================================

use image::Rgba;

use crate::config::EngineConfig;

/// Which blend equation a stamp uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrushMode {
    /// `(ONE, ONE_MINUS_SRC_ALPHA)` with a premultiplied source.
    Paint,
    /// `(ZERO, ONE_MINUS_SRC_ALPHA)`: scales the destination down, colour and
    /// alpha together, so the straight colour that remains is unchanged.
    Erase,
}

/// What the host passes per stroke: colour and eraser flag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Brush {
    /// Straight-alpha colour.  For the eraser only alpha matters (strength).
    pub color: Rgba<u8>,
    pub erase: bool,
}

impl Brush {
    pub fn paint(color: Rgba<u8>) -> Self {
        Self { color, erase: false }
    }

    /// Full-strength eraser.
    pub fn eraser() -> Self {
        Self {
            color: Rgba([0, 0, 0, 255]),
            erase: true,
        }
    }

    pub fn mode(&self) -> BrushMode {
        if self.erase { BrushMode::Erase } else { BrushMode::Paint }
    }

    /// Source colour as the brush program outputs it at full coverage.
    pub fn premultiplied(&self) -> [f32; 4] {
        let a = self.color[3] as f32 / 255.0;
        if self.erase {
            return [0.0, 0.0, 0.0, a];
        }
        [
            self.color[0] as f32 / 255.0 * a,
            self.color[1] as f32 / 255.0 * a,
            self.color[2] as f32 / 255.0 * a,
            a,
        ]
    }
}

/// One stamp in layer-local supersampled pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StampParams {
    pub center: [f32; 2],
    pub radius: f32,
    /// Premultiplied.
    pub color: [f32; 4],
    /// Half-width of the edge ramp.
    pub softness: f32,
}

impl StampParams {
    /// Extra quad extent around the radius so the ramp is not clipped.
    pub fn margin(&self) -> f32 {
        self.softness + 1.0
    }

    /// Coverage at a layer-local point: signed distance through a smoothstep.
    pub fn coverage(&self, p: [f32; 2]) -> f32 {
        let dx = p[0] - self.center[0];
        let dy = p[1] - self.center[1];
        let d = (dx * dx + dy * dy).sqrt() - self.radius;
        1.0 - smoothstep(-self.softness, self.softness, d)
    }
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ============================================================================
// PRESSURE
// ============================================================================

/// Maps pen pressure (0‥1) to a size multiplier.
pub trait PressureCurve {
    fn size_factor(&self, pressure: f32) -> f32;
}

impl<F: Fn(f32) -> f32> PressureCurve for F {
    fn size_factor(&self, pressure: f32) -> f32 {
        self(pressure)
    }
}

/// Size proportional to pressure.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearPressure;

impl PressureCurve for LinearPressure {
    fn size_factor(&self, pressure: f32) -> f32 {
        pressure
    }
}

/// Ignores pressure (mouse input).
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstantPressure;

impl PressureCurve for ConstantPressure {
    fn size_factor(&self, _pressure: f32) -> f32 {
        1.0
    }
}

/// `min + (1 - min) * pressure^gamma`.
#[derive(Clone, Copy, Debug)]
pub struct GammaPressure {
    pub gamma: f32,
    pub min_factor: f32,
}

impl PressureCurve for GammaPressure {
    fn size_factor(&self, pressure: f32) -> f32 {
        self.min_factor + (1.0 - self.min_factor) * pressure.powf(self.gamma)
    }
}

// ============================================================================
// LINE STAMPING
// ============================================================================

/// A stamp position in world (base canvas) coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldStamp {
    pub center: [f32; 2],
    pub radius: f32,
}

/// Distance between consecutive stamps for a brush of `size`.
pub fn stamp_step(size: f32, config: &EngineConfig) -> f32 {
    (size / config.stamp_step_divisor).max(config.min_stamp_step)
}

/// Stamps covering the segment `from → to`.  Returns `None` for non-finite
/// input.  A zero-length segment yields exactly one stamp sized by
/// `pressure[1]`.
pub fn line_stamps(
    from: [f32; 2],
    to: [f32; 2],
    size: f32,
    pressure: [f32; 2],
    curve: &dyn PressureCurve,
    config: &EngineConfig,
) -> Option<Vec<WorldStamp>> {
    let inputs = [from[0], from[1], to[0], to[1], size, pressure[0], pressure[1]];
    if inputs.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let radius_at = |p: f32| -> Option<f32> {
        let r = size * curve.size_factor(p.clamp(0.0, 1.0)) * 0.5;
        r.is_finite().then_some(r.max(0.0))
    };

    let dx = to[0] - from[0];
    let dy = to[1] - from[1];
    let distance = (dx * dx + dy * dy).sqrt();
    if distance <= f32::EPSILON {
        return Some(vec![WorldStamp {
            center: to,
            radius: radius_at(pressure[1])?,
        }]);
    }

    let steps = (distance / stamp_step(size, config)).ceil().max(1.0) as usize;
    let mut stamps = Vec::with_capacity(steps + 1);
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let p = pressure[0] + (pressure[1] - pressure[0]) * t;
        stamps.push(WorldStamp {
            center: [from[0] + dx * t, from[1] + dy * t],
            radius: radius_at(p)?,
        });
    }
    Some(stamps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_line_is_one_stamp_sized_by_end_pressure() {
        let config = EngineConfig::default();
        let stamps =
            line_stamps([5.0, 5.0], [5.0, 5.0], 10.0, [0.2, 0.8], &LinearPressure, &config).unwrap();
        assert_eq!(stamps.len(), 1);
        assert!((stamps[0].radius - 4.0).abs() < 1e-6);
        assert_eq!(stamps[0].center, [5.0, 5.0]);
    }

    #[test]
    fn step_is_quarter_size_with_floor() {
        let config = EngineConfig::default();
        assert_eq!(stamp_step(20.0, &config), 5.0);
        assert_eq!(stamp_step(1.0, &config), 0.5);
    }

    #[test]
    fn line_stamps_are_dense_and_interpolate_pressure() {
        let config = EngineConfig::default();
        let stamps =
            line_stamps([0.0, 0.0], [20.0, 0.0], 8.0, [0.0, 1.0], &LinearPressure, &config).unwrap();
        // step 2 px over 20 px: 10 intervals, both ends stamped
        assert_eq!(stamps.len(), 11);
        assert_eq!(stamps[0].radius, 0.0);
        assert!((stamps[10].radius - 4.0).abs() < 1e-6);
        assert!((stamps[5].center[0] - 10.0).abs() < 1e-5);
        for pair in stamps.windows(2) {
            assert!(pair[1].center[0] - pair[0].center[0] <= 2.0 + 1e-5);
        }
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let config = EngineConfig::default();
        assert!(line_stamps([f32::NAN, 0.0], [1.0, 1.0], 4.0, [1.0, 1.0], &ConstantPressure, &config).is_none());
        assert!(line_stamps([0.0, 0.0], [1.0, 1.0], f32::INFINITY, [1.0, 1.0], &ConstantPressure, &config).is_none());
        let nan_curve = |_p: f32| f32::NAN;
        assert!(line_stamps([0.0, 0.0], [1.0, 1.0], 4.0, [1.0, 1.0], &nan_curve, &config).is_none());
    }

    #[test]
    fn coverage_is_solid_inside_and_zero_outside() {
        let stamp = StampParams {
            center: [10.0, 10.0],
            radius: 4.0,
            color: [1.0; 4],
            softness: 1.0,
        };
        assert_eq!(stamp.coverage([10.0, 10.0]), 1.0);
        assert!((stamp.coverage([14.0, 10.0]) - 0.5).abs() < 1e-6);
        assert_eq!(stamp.coverage([16.0, 10.0]), 0.0);
    }

    #[test]
    fn eraser_source_has_no_colour() {
        assert_eq!(Brush::eraser().premultiplied(), [0.0, 0.0, 0.0, 1.0]);
        let half = Brush::paint(Rgba([255, 0, 0, 128])).premultiplied();
        assert!((half[0] - half[3]).abs() < 1e-6);
    }
}
