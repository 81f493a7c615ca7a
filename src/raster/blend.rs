// ============================================================================
// FIXED-FUNCTION BLENDING
// ============================================================================
//
// `out = src * F_src + dst * F_dst`, per channel, clamped to the UNORM range.
// The same table drives the wgpu pipelines (see `gpu::compositor`).
// ============================================================================

use crate::brush::BrushMode;
use crate::canvas::BlendMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    OneMinusSrcColor,
    DstColor,
}

impl BlendFactor {
    #[inline]
    fn weight(self, src: &[f32; 4], dst: &[f32; 4], channel: usize) -> f32 {
        match self {
            BlendFactor::Zero => 0.0,
            BlendFactor::One => 1.0,
            BlendFactor::SrcAlpha => src[3],
            BlendFactor::OneMinusSrcAlpha => 1.0 - src[3],
            BlendFactor::OneMinusSrcColor => 1.0 - src[channel],
            BlendFactor::DstColor => dst[channel],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendComponent {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

const OVER: BlendComponent = BlendComponent {
    src: BlendFactor::One,
    dst: BlendFactor::OneMinusSrcAlpha,
};

impl BlendState {
    /// Blending disabled.
    pub const REPLACE: BlendState = BlendState {
        color: BlendComponent { src: BlendFactor::One, dst: BlendFactor::Zero },
        alpha: BlendComponent { src: BlendFactor::One, dst: BlendFactor::Zero },
    };

    /// Premultiplied source-over.
    pub const PREMULTIPLIED_OVER: BlendState = BlendState { color: OVER, alpha: OVER };

    /// Destination scaled by `1 - src.a` in every channel.
    pub const ERASE: BlendState = BlendState {
        color: BlendComponent { src: BlendFactor::Zero, dst: BlendFactor::OneMinusSrcAlpha },
        alpha: BlendComponent { src: BlendFactor::Zero, dst: BlendFactor::OneMinusSrcAlpha },
    };

    pub fn for_layer(mode: BlendMode) -> BlendState {
        let color = match mode {
            BlendMode::Normal => OVER,
            BlendMode::Multiply => BlendComponent {
                src: BlendFactor::DstColor,
                dst: BlendFactor::OneMinusSrcAlpha,
            },
            BlendMode::Screen => BlendComponent {
                src: BlendFactor::One,
                dst: BlendFactor::OneMinusSrcColor,
            },
            BlendMode::Add => BlendComponent {
                src: BlendFactor::One,
                dst: BlendFactor::One,
            },
        };
        BlendState { color, alpha: OVER }
    }

    pub fn for_brush(mode: BrushMode) -> BlendState {
        match mode {
            BrushMode::Paint => Self::PREMULTIPLIED_OVER,
            BrushMode::Erase => Self::ERASE,
        }
    }

    #[inline]
    pub fn apply(&self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        let mut out = [0.0; 4];
        for c in 0..3 {
            out[c] = src[c] * self.color.src.weight(&src, &dst, c)
                + dst[c] * self.color.dst.weight(&src, &dst, c);
        }
        out[3] = src[3] * self.alpha.src.weight(&src, &dst, 3)
            + dst[3] * self.alpha.dst.weight(&src, &dst, 3);
        out.map(|v| v.clamp(0.0, 1.0))
    }
}
