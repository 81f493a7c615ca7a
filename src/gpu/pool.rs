// ============================================================================
// TEXTURE POOL — recycle released layer textures
// ============================================================================

use std::collections::HashMap;

use super::texture::LayerTexture;

/// Released layer textures keyed by `(width, height)`.
///
/// Deleting a layer and adding one of the same size (undo / redo, layer
/// duplication) is common; reusing the texture skips a device allocation.
/// Reused textures hold stale pixels and must be cleared by the caller.
pub struct TexturePool {
    pool: HashMap<(u32, u32), Vec<LayerTexture>>,
    /// Maximum number of textures to keep per size.
    max_per_key: usize,
}

impl TexturePool {
    pub fn new() -> Self {
        Self {
            pool: HashMap::new(),
            max_per_key: 4,
        }
    }

    pub fn acquire(&mut self, width: u32, height: u32) -> Option<LayerTexture> {
        self.pool.get_mut(&(width, height)).and_then(|v| v.pop())
    }

    /// If the pool is full for this size the texture is dropped.
    pub fn release(&mut self, texture: LayerTexture) {
        let entry = self.pool.entry(texture.size()).or_default();
        if entry.len() < self.max_per_key {
            entry.push(texture);
        }
    }

    pub fn pooled_count(&self) -> usize {
        self.pool.values().map(|v| v.len()).sum()
    }

    /// Approximate GPU memory held by pooled textures (bytes).
    pub fn pooled_memory_bytes(&self) -> usize {
        self.pool
            .iter()
            .map(|((w, h), textures)| *w as usize * *h as usize * 4 * textures.len())
            .sum()
    }
}

impl Default for TexturePool {
    fn default() -> Self {
        Self::new()
    }
}
