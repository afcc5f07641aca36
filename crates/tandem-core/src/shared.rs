//! Atomic publication of the reference snapshot pair.
//!
//! The control context replaces whole immutable snapshots; the audio
//! context loads the current pointer once per block. No locks, no
//! partial mutation. The base and tempo-shifted variants are peers:
//! which one a block reads is a control flag, not a structural
//! difference.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tandem_midi::ReferenceData;

#[derive(Default)]
pub struct SharedReference {
    base: ArcSwapOption<ReferenceData>,
    shifted: ArcSwapOption<ReferenceData>,
}

impl SharedReference {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish a freshly built snapshot pair.
    pub fn publish(&self, base: Arc<ReferenceData>, shifted: Arc<ReferenceData>) {
        self.base.store(Some(base));
        self.shifted.store(Some(shifted));
    }

    pub fn unload(&self) {
        self.base.store(None);
        self.shifted.store(None);
    }

    pub fn is_loaded(&self) -> bool {
        self.base.load().is_some()
    }

    /// Snapshot selected by the tempo-shift flag. Falls back to the
    /// base variant if the shifted twin is somehow absent.
    pub fn active(&self, tempo_shift: bool) -> Option<Arc<ReferenceData>> {
        if tempo_shift {
            if let Some(shifted) = self.shifted.load_full() {
                return Some(shifted);
            }
        }
        self.base.load_full()
    }

    pub fn base(&self) -> Option<Arc<ReferenceData>> {
        self.base.load_full()
    }

    pub fn shifted(&self) -> Option<Arc<ReferenceData>> {
        self.shifted.load_full()
    }

    /// Zero the matched bitmaps of both variants. Audio-thread-safe:
    /// only existing atomic words are touched.
    pub fn clear_matched(&self) {
        if let Some(base) = self.base.load().as_deref() {
            base.clear_matched();
        }
        if let Some(shifted) = self.shifted.load().as_deref() {
            shifted.clear_matched();
        }
    }
}
