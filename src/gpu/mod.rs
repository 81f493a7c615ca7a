// ============================================================================
// GPU MODULE — wgpu rendering backend for Tegaki
// ============================================================================
//
// Architecture:
//   context.rs    — wgpu Device, Queue, adapter init, shared unit quad
//   shaders.rs    — the compositor and brush WGSL programs (inline strings)
//   texture.rs    — LayerTexture: render target + sampled texture
//   compositor.rs — blend-mode pipelines, present pipeline
//   readback.rs   — staging-buffer copies of texture regions to the CPU
//   brush.rs      — soft round stamp pipelines (paint / erase)
//   pool.rs       — texture recycling pool
//   renderer.rs   — WgpuBackend, the `DrawingBackend` implementation
// ============================================================================

pub mod brush;
pub mod compositor;
pub mod context;
pub mod pool;
pub mod readback;
pub mod renderer;
pub mod shaders;
pub mod texture;

pub use renderer::WgpuBackend;
