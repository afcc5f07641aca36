//! Active (currently sounding) live-note tracking.

/// Capacity of the active-note table. A live note that would exceed it
/// is silently dropped from tracking: its eventual note-off passes
/// through uncorrected rather than blocking or allocating.
pub const MAX_ACTIVE_NOTES: usize = 64;

/// A live note awaiting its note-off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveNote {
    pub pitch: u8,
    pub channel: u8,
    /// Index of the reference note this live note matched, if any.
    pub reference_index: Option<usize>,
    /// Absolute sample of the live note-on.
    pub on_sample: i64,
}

/// Fixed-capacity table, scanned linearly. Not a map: the audio thread
/// must never allocate, and polyphony keeps this small.
pub struct ActiveNoteTable {
    slots: [ActiveNote; MAX_ACTIVE_NOTES],
    len: usize,
}

const EMPTY_SLOT: ActiveNote = ActiveNote {
    pitch: 0,
    channel: 0,
    reference_index: None,
    on_sample: 0,
};

impl ActiveNoteTable {
    pub fn new() -> Self {
        Self {
            slots: [EMPTY_SLOT; MAX_ACTIVE_NOTES],
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Track a note-on. Returns `false` on overflow (note dropped from
    /// tracking).
    #[must_use]
    pub fn insert(&mut self, note: ActiveNote) -> bool {
        if self.len >= MAX_ACTIVE_NOTES {
            return false;
        }
        self.slots[self.len] = note;
        self.len += 1;
        true
    }

    /// Resolve a note-off: remove and return the oldest active note
    /// with this pitch and channel.
    pub fn take(&mut self, pitch: u8, channel: u8) -> Option<ActiveNote> {
        let index = self.slots[..self.len]
            .iter()
            .position(|n| n.pitch == pitch && n.channel == channel)?;
        let note = self.slots[index];
        self.slots.copy_within(index + 1..self.len, index);
        self.len -= 1;
        Some(note)
    }

    /// Drop notes whose note-off never arrived within the timeout.
    /// Returns how many were evicted.
    pub fn evict_stale(&mut self, now: i64, timeout_samples: i64) -> usize {
        if timeout_samples <= 0 {
            return 0;
        }
        let mut evicted = 0;
        let mut i = 0;
        while i < self.len {
            if now - self.slots[i].on_sample > timeout_samples {
                self.slots.copy_within(i + 1..self.len, i);
                self.len -= 1;
                evicted += 1;
            } else {
                i += 1;
            }
        }
        evicted
    }
}

impl Default for ActiveNoteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, on_sample: i64) -> ActiveNote {
        ActiveNote {
            pitch,
            channel: 0,
            reference_index: None,
            on_sample,
        }
    }

    #[test]
    fn insert_then_take() {
        let mut table = ActiveNoteTable::new();
        assert!(table.insert(note(60, 0)));
        assert!(table.insert(note(64, 10)));
        assert_eq!(table.take(60, 0), Some(note(60, 0)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.take(60, 0), None);
    }

    #[test]
    fn take_is_fifo_for_repeated_pitches() {
        let mut table = ActiveNoteTable::new();
        assert!(table.insert(note(60, 0)));
        assert!(table.insert(note(60, 100)));
        assert_eq!(table.take(60, 0).unwrap().on_sample, 0);
        assert_eq!(table.take(60, 0).unwrap().on_sample, 100);
    }

    #[test]
    fn channel_must_agree() {
        let mut table = ActiveNoteTable::new();
        assert!(table.insert(ActiveNote {
            channel: 2,
            ..note(60, 0)
        }));
        assert_eq!(table.take(60, 0), None);
        assert!(table.take(60, 2).is_some());
    }

    #[test]
    fn overflow_drops_silently() {
        let mut table = ActiveNoteTable::new();
        for i in 0..MAX_ACTIVE_NOTES {
            assert!(table.insert(note(i as u8, 0)));
        }
        assert!(!table.insert(note(127, 0)));
        assert_eq!(table.len(), MAX_ACTIVE_NOTES);
    }

    #[test]
    fn stale_notes_are_evicted() {
        let mut table = ActiveNoteTable::new();
        assert!(table.insert(note(60, 0)));
        assert!(table.insert(note(64, 90_000)));
        assert_eq!(table.evict_stale(100_000, 48_000), 1);
        assert_eq!(table.len(), 1);
        assert!(table.take(64, 0).is_some());
    }

    #[test]
    fn zero_timeout_disables_eviction() {
        let mut table = ActiveNoteTable::new();
        assert!(table.insert(note(60, 0)));
        assert_eq!(table.evict_stale(1_000_000, 0), 0);
        assert_eq!(table.len(), 1);
    }
}
