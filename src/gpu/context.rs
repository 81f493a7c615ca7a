// ============================================================================
// GPU CONTEXT — wgpu Device, Queue, adapter initialization, shared quad
// ============================================================================

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::error::{EngineError, EngineResult};

/// Unit quad as two triangles, `(0,0)` top-left.
const QUAD_VERTICES: [[f32; 2]; 6] = [
    [0.0, 0.0],
    [1.0, 0.0],
    [0.0, 1.0],
    [0.0, 1.0],
    [1.0, 0.0],
    [1.0, 1.0],
];

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

/// Vertex layout of [`GpuContext::quad`], shared by both programs.
pub fn quad_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &QUAD_ATTRIBUTES,
    }
}

/// Holds the core wgpu resources for one engine.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    /// Maximum texture dimension supported by this device.
    pub max_texture_dim: u32,
    /// Static unit-quad vertex buffer.
    pub quad: wgpu::Buffer,
}

impl GpuContext {
    /// Tries a hardware adapter first, then the fallback (software)
    /// adapter.  Headless: no surface is involved.
    pub fn new(preferred_gpu: &str) -> EngineResult<Self> {
        if let Some(ctx) = pollster::block_on(Self::new_async(preferred_gpu, false)) {
            return Ok(ctx);
        }
        tracing::warn!("hardware adapter unavailable, trying fallback adapter");
        pollster::block_on(Self::new_async(preferred_gpu, true))
            .ok_or_else(|| EngineError::init("no wgpu adapter available"))
    }

    async fn new_async(preferred_gpu: &str, force_fallback: bool) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power = match preferred_gpu.to_lowercase().as_str() {
            "low power" | "integrated" => wgpu::PowerPreference::LowPower,
            _ => wgpu::PowerPreference::HighPerformance,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power,
                compatible_surface: None,
                force_fallback_adapter: force_fallback,
            })
            .await?;

        let adapter_name = adapter.get_info().name.clone();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Tegaki GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                },
                None,
            )
            .await
            .ok()?;

        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("unit_quad"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        tracing::info!("wgpu adapter: {adapter_name} (max texture {})", limits.max_texture_dimension_2d);

        Some(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name,
            max_texture_dim: limits.max_texture_dimension_2d,
            quad,
        })
    }

    /// Check if a texture of the given dimensions can be created.
    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        width > 0 && height > 0 && width <= self.max_texture_dim && height <= self.max_texture_dim
    }

    /// Submit a single encoder's commands.
    pub fn submit_one(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Compile a WGSL program.  Validation errors come back as
    /// `ShaderCompile` instead of the device's uncaptured-error panic.
    pub fn compile_program(&self, label: &str, source: &str) -> EngineResult<wgpu::ShaderModule> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(EngineError::shader(label, err.to_string())),
            None => Ok(module),
        }
    }

    /// Run `create` inside an out-of-memory error scope.
    pub fn try_allocate<T>(&self, what: &str, create: impl FnOnce(&wgpu::Device) -> T) -> EngineResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(EngineError::allocation(format!("{what}: {err}"))),
            None => Ok(value),
        }
    }
}
