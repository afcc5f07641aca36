//! Reference tempo lookup with a monotonic cursor.

use tandem_midi::{ReferenceTempoEvent, DEFAULT_BPM};

/// Walks the sorted reference tempo-event list as elapsed time moves
/// forward (and back, across transport rewinds), returning the BPM in
/// effect at the queried moment. O(1) per block in the common case.
#[derive(Debug, Default)]
pub struct TempoTracker {
    cursor: usize,
}

impl TempoTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// BPM of the event at or before `elapsed` seconds.
    pub fn bpm_at(&mut self, events: &[ReferenceTempoEvent], elapsed: f64) -> f64 {
        if events.is_empty() {
            return DEFAULT_BPM;
        }
        if self.cursor >= events.len() {
            self.cursor = events.len() - 1;
        }
        while self.cursor + 1 < events.len() && events[self.cursor + 1].time <= elapsed {
            self.cursor += 1;
        }
        while self.cursor > 0 && events[self.cursor].time > elapsed {
            self.cursor -= 1;
        }
        events[self.cursor].bpm
    }
}
