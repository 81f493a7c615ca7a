// ============================================================================
// GPU SHADERS — the two WGSL programs, kept inline
// ============================================================================
//
// Both programs draw the shared unit quad (vertex buffer, location 0) and
// go through a pixel-space → clip-space matrix built by `coords::projection`.
// Texture coordinates are top-down, matching the upload order, so no shader
// ever flips Y on its own.

// ============================================================================
// COMPOSITOR — textured quad with a source-resolution-aware filter
// ============================================================================
//
// filter_mode 0: one bilinear tap (layer → composite, same resolution).
// filter_mode 1: four taps at ±0.25 texel, optionally sharpened against the
//                same pattern at ±0.75 texel (composite → display).
pub const COMPOSITOR_SHADER: &str = r#"
struct CompositeUniforms {
    mvp: mat4x4<f32>,
    src_size: vec2<f32>,
    opacity: f32,
    filter_mode: u32,
    sharpness: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

@group(0) @binding(0) var<uniform> u: CompositeUniforms;
@group(1) @binding(0) var src_tex: texture_2d<f32>;
@group(1) @binding(1) var src_samp: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_composite(@location(0) pos: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = u.mvp * vec4<f32>(pos * u.src_size, 0.0, 1.0);
    out.uv = pos;
    return out;
}

fn tap4(uv: vec2<f32>, spread: f32) -> vec4<f32> {
    let t = vec2<f32>(spread, spread) / u.src_size;
    let a = textureSampleLevel(src_tex, src_samp, uv + vec2<f32>(-t.x, -t.y), 0.0);
    let b = textureSampleLevel(src_tex, src_samp, uv + vec2<f32>( t.x, -t.y), 0.0);
    let c = textureSampleLevel(src_tex, src_samp, uv + vec2<f32>(-t.x,  t.y), 0.0);
    let d = textureSampleLevel(src_tex, src_samp, uv + vec2<f32>( t.x,  t.y), 0.0);
    return (a + b + c + d) * 0.25;
}

@fragment
fn fs_composite(in: VertexOutput) -> @location(0) vec4<f32> {
    var color: vec4<f32>;
    if (u.filter_mode == 0u) {
        color = textureSampleLevel(src_tex, src_samp, in.uv, 0.0);
    } else {
        let soft = tap4(in.uv, 0.25);
        color = soft;
        if (u.sharpness > 0.0) {
            let ring = tap4(in.uv, 0.75);
            let sharp = soft + u.sharpness * (soft - ring);
            let a = clamp(sharp.a, 0.0, 1.0);
            color = vec4<f32>(clamp(sharp.rgb, vec3<f32>(0.0), vec3<f32>(a)), a);
        }
    }
    return color * u.opacity;
}
"#;

// ============================================================================
// BRUSH — one instanced soft circle per stamp, signed distance through smoothstep
// ============================================================================
pub const BRUSH_SHADER: &str = r#"
struct BrushView {
    proj: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> view: BrushView;

// One instance per stamp; `shape` is (radius, softness, margin).
struct Stamp {
    @location(1) color: vec4<f32>,
    @location(2) center: vec2<f32>,
    @location(3) shape: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) local: vec2<f32>,
    @location(1) @interpolate(flat) color: vec4<f32>,
    @location(2) @interpolate(flat) center: vec2<f32>,
    @location(3) @interpolate(flat) shape: vec2<f32>,
};

@vertex
fn vs_brush(@location(0) pos: vec2<f32>, stamp: Stamp) -> VertexOutput {
    let extent = stamp.shape.x + stamp.shape.z;
    let local = stamp.center + (pos * 2.0 - vec2<f32>(1.0, 1.0)) * extent;
    var out: VertexOutput;
    out.position = view.proj * vec4<f32>(local, 0.0, 1.0);
    out.local = local;
    out.color = stamp.color;
    out.center = stamp.center;
    out.shape = stamp.shape.xy;
    return out;
}

@fragment
fn fs_brush(in: VertexOutput) -> @location(0) vec4<f32> {
    let d = length(in.local - in.center) - in.shape.x;
    let coverage = 1.0 - smoothstep(-in.shape.y, in.shape.y, d);
    if (coverage <= 0.0) {
        discard;
    }
    return in.color * coverage;
}
"#;
