// ============================================================================
// STROKE LIFECYCLE & FRAME SCHEDULING
// ============================================================================

use crate::canvas::LayerId;
use crate::dirty::DirtyRect;

/// `Idle → Stroking → Syncing → Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StrokePhase {
    #[default]
    Idle,
    Stroking,
    Syncing,
}

/// Per-stroke state: target layer and the dirty rect accumulated while the
/// pointer is down.
#[derive(Debug, Default)]
pub struct StrokeTracker {
    phase: StrokePhase,
    layer: Option<LayerId>,
    dirty: DirtyRect,
}

impl StrokeTracker {
    pub fn phase(&self) -> StrokePhase {
        self.phase
    }

    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    pub fn dirty(&self) -> DirtyRect {
        self.dirty
    }

    /// Pointer down.  A stroke still open is closed and handed back with
    /// its dirty rect so the caller can still sync it.
    pub fn begin(&mut self, layer: LayerId) -> Option<(LayerId, DirtyRect)> {
        let abandoned = match (self.phase, self.layer) {
            (StrokePhase::Idle, _) | (_, None) => None,
            (_, Some(open)) => {
                tracing::debug!("stroke on {open} replaced before it was finished");
                Some((open, self.dirty)).filter(|(_, rect)| !rect.is_empty())
            }
        };
        self.phase = StrokePhase::Stroking;
        self.layer = Some(layer);
        self.dirty = DirtyRect::EMPTY;
        abandoned
    }

    /// Grow the stroke's dirty rect if `layer` is the one being stroked.
    pub fn record(&mut self, layer: LayerId, rect: &DirtyRect) {
        if self.phase == StrokePhase::Stroking && self.layer == Some(layer) {
            self.dirty = self.dirty.union(rect);
        }
    }

    /// Pointer up: enter `Syncing` and hand out what must be pulled back.
    pub fn finish(&mut self) -> Option<(LayerId, DirtyRect)> {
        if self.phase != StrokePhase::Stroking {
            return None;
        }
        self.phase = StrokePhase::Syncing;
        self.layer.map(|id| (id, self.dirty))
    }

    /// Sync done (or abandoned).
    pub fn reset(&mut self) {
        self.phase = StrokePhase::Idle;
        self.layer = None;
        self.dirty = DirtyRect::EMPTY;
    }
}

/// Coalesces redraw requests between frames.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    pending: DirtyRect,
    requests: u32,
}

impl FrameScheduler {
    pub fn request(&mut self, rect: &DirtyRect) {
        if rect.is_empty() {
            return;
        }
        self.pending = self.pending.union(rect);
        self.requests += 1;
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Requests folded into the pending redraw.
    pub fn coalesced(&self) -> u32 {
        self.requests
    }

    pub fn take(&mut self) -> Option<DirtyRect> {
        if !self.is_pending() {
            return None;
        }
        let rect = self.pending;
        self.pending = DirtyRect::EMPTY;
        self.requests = 0;
        Some(rect)
    }
}
