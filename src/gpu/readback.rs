// ============================================================================
// READBACK — texture regions copied back to the CPU through a staging buffer
// ============================================================================
//
// Copies land in a MAP_READ buffer whose rows are padded to wgpu's copy
// alignment.  The buffer is kept between reads and only regrown when a
// larger region comes through.
// ============================================================================

use super::context::GpuContext;
use super::renderer::GPU_ROW_ORDER;
use crate::backend::Readback;
use crate::dirty::PixelRect;
use crate::error::{EngineError, EngineResult};

/// Bytes per row of a `width`-texel RGBA8 copy, padded to the copy alignment.
pub(crate) fn padded_row_bytes(width: u32) -> u32 {
    (width * 4).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Drop the alignment padding from each of `rows` rows.
fn unpad_rows(mapped: &[u8], row_bytes: usize, padded: usize, rows: usize) -> Vec<u8> {
    let mut packed = Vec::with_capacity(row_bytes * rows);
    for row in mapped.chunks(padded).take(rows) {
        packed.extend_from_slice(&row[..row_bytes]);
    }
    packed
}

#[derive(Default)]
pub struct StagingBuffer {
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn reserve(&mut self, ctx: &GpuContext, size: u64) -> EngineResult<&wgpu::Buffer> {
        if self.buffer.is_none() || self.capacity < size {
            let buffer = ctx.try_allocate("readback staging buffer", |device| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("readback_staging"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })?;
            tracing::debug!("readback staging buffer grown to {size} bytes");
            self.buffer = Some(buffer);
            self.capacity = size;
        }
        self.buffer
            .as_ref()
            .ok_or_else(|| EngineError::allocation("readback staging buffer missing"))
    }

    /// Read `rect` of `texture` as packed RGBA8.  Blocks until the copy lands.
    pub fn read(&mut self, ctx: &GpuContext, texture: &wgpu::Texture, rect: PixelRect) -> EngineResult<Readback> {
        if rect.is_empty() {
            return Ok(Readback { width: 0, height: 0, data: Vec::new(), row_order: GPU_ROW_ORDER });
        }
        let padded = padded_row_bytes(rect.width);
        let size = padded as u64 * rect.height as u64;
        let staging = self.reserve(ctx, size)?;

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: rect.x, y: rect.y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d { width: rect.width, height: rect.height, depth_or_array_layers: 1 },
        );
        ctx.submit_one(encoder);

        let slice = staging.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| EngineError::allocation(format!("readback channel closed: {e}")))?
            .map_err(|e| EngineError::allocation(format!("readback map failed: {e}")))?;

        let data = {
            let mapped = slice.get_mapped_range();
            unpad_rows(&mapped, rect.width as usize * 4, padded as usize, rect.height as usize)
        };
        staging.unmap();

        Ok(Readback { width: rect.width, height: rect.height, data, row_order: GPU_ROW_ORDER })
    }
}
