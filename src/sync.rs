// ============================================================================
// CPU ⇄ GPU SYNC — lazy upload and dirty-region readback
// ============================================================================

use crate::backend::DrawingBackend;
use crate::canvas::Layer;
use crate::coords::supersampled_extent;
use crate::dirty::DirtyRect;
use crate::error::EngineResult;
use crate::resample::{downsample_into, supersampled_rect, upsample_premultiplied};

/// Make sure the backend holds an up-to-date texture for `layer`.
///
/// Allocates when the layer has no texture or its size changed, then uploads
/// the CPU buffer if it is dirty.  A freshly allocated texture is already
/// transparent, so a blank buffer is not uploaded.
pub fn ensure_layer<B: DrawingBackend + ?Sized>(backend: &mut B, layer: &mut Layer) -> EngineResult<()> {
    let ss = backend.supersample();
    let id = layer.id();
    let size = (
        supersampled_extent(layer.width(), ss),
        supersampled_extent(layer.height(), ss),
    );

    if backend.layer_size(id) != Some(size) {
        backend.allocate_layer(id, size.0, size.1)?;
        if layer.is_blank() {
            layer.mark_uploaded();
            return Ok(());
        }
    } else if !layer.is_dirty() {
        return Ok(());
    }

    let pixels = upsample_premultiplied(layer.pixels(), size.0, size.1, ss);
    backend.upload_layer(id, &pixels)?;
    layer.mark_uploaded();
    tracing::debug!("layer {id}: uploaded {}×{} → {}×{}", layer.width(), layer.height(), size.0, size.1);
    Ok(())
}

/// Pull the part of `layer` under `world_rect` (base canvas coordinates)
/// back into its CPU buffer.  Returns whether anything was written.
///
/// Empty rects and layers without a texture are a no-op.  Only the
/// GPU → CPU staleness flag is cleared.
pub fn pull_to_cpu<B: DrawingBackend + ?Sized>(
    backend: &mut B,
    layer: &mut Layer,
    world_rect: DirtyRect,
) -> EngineResult<bool> {
    if world_rect.is_empty() {
        return Ok(false);
    }
    let id = layer.id();
    let Some((tex_w, tex_h)) = backend.layer_size(id) else {
        return Ok(false);
    };
    let Some(inverse) = layer.model.inverse() else {
        return Ok(false);
    };
    let ss = backend.supersample();

    // World (base) → world (SS) → layer-local (SS), as a bounding box.
    let world = world_rect.scaled(ss);
    let mut local = DirtyRect::EMPTY;
    for corner in [
        [world.min_x, world.min_y],
        [world.max_x, world.min_y],
        [world.min_x, world.max_y],
        [world.max_x, world.max_y],
    ] {
        let p = inverse.transform_point(corner);
        local.include_point(p[0], p[1]);
    }
    let Some(dest) = local.to_pixel_rect(1.0 / ss, layer.width(), layer.height()) else {
        return Ok(false);
    };
    let Some(src) = supersampled_rect(dest, ss, tex_w, tex_h) else {
        return Ok(false);
    };
    let Some(readback) = backend.read_layer(id, src)? else {
        return Ok(false);
    };
    let data = readback.into_top_down();
    downsample_into(&data, src, ss, layer.pixels_for_sync(), dest);
    layer.mark_cpu_synced();
    tracing::debug!("layer {id}: synced {}×{} at ({}, {})", dest.width, dest.height, dest.x, dest.y);
    Ok(true)
}
