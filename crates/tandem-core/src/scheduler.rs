//! Fixed-capacity, sample-ordered output event queue.

use tandem_midi::RawMidiEvent;

/// Queue capacity. Overflow is handled by immediate pass-through, not
/// by dropping the event.
pub const MAX_QUEUED_EVENTS: usize = 256;

/// A corrected MIDI event waiting for its due sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledMidiEvent {
    /// Absolute sample position at which the event should be emitted.
    pub due_sample: i64,
    /// Insertion order; tie-break only.
    seq: u64,
    pub data: [u8; 3],
    pub len: u8,
}

impl ScheduledMidiEvent {
    const EMPTY: Self = Self {
        due_sample: 0,
        seq: 0,
        data: [0; 3],
        len: 0,
    };

    #[inline]
    fn key(&self) -> (i64, u64) {
        (self.due_sample, self.seq)
    }
}

/// Insertion-sorted pending-event queue, keyed by (due sample,
/// insertion order) ascending. All storage is in place; scheduling and
/// draining never allocate.
pub struct EventScheduler {
    queue: [ScheduledMidiEvent; MAX_QUEUED_EVENTS],
    len: usize,
    next_seq: u64,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self {
            queue: [ScheduledMidiEvent::EMPTY; MAX_QUEUED_EVENTS],
            len: 0,
            next_seq: 0,
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
        self.next_seq = 0;
    }

    /// Insert an event. Returns `false` when the queue is full; the
    /// caller then emits the event immediately (pass-through) so
    /// overload degrades timing, never audibility.
    #[must_use]
    pub fn schedule(&mut self, due_sample: i64, data: [u8; 3], len: u8) -> bool {
        if self.len >= MAX_QUEUED_EVENTS {
            return false;
        }
        let event = ScheduledMidiEvent {
            due_sample,
            seq: self.next_seq,
            data,
            len,
        };
        self.next_seq += 1;

        // Linear insert from the tail; the queue is small and usually
        // nearly sorted already.
        let mut i = self.len;
        while i > 0 && self.queue[i - 1].key() > event.key() {
            self.queue[i] = self.queue[i - 1];
            i -= 1;
        }
        self.queue[i] = event;
        self.len += 1;
        true
    }

    /// Emit every event due before `block_end` (absolute samples),
    /// with its in-block offset clamped into the current block.
    pub fn drain(
        &mut self,
        block_start: i64,
        sample_count: usize,
        mut emit: impl FnMut(RawMidiEvent),
    ) {
        let block_end = block_start + sample_count as i64;
        let last_offset = sample_count.saturating_sub(1);
        while self.len > 0 && self.queue[0].due_sample < block_end {
            let event = self.queue[0];
            self.queue.copy_within(1..self.len, 0);
            self.len -= 1;

            let offset = (event.due_sample - block_start).clamp(0, last_offset as i64) as usize;
            emit(RawMidiEvent::new(offset, event.data, event.len));
        }
    }
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(pitch: u8) -> [u8; 3] {
        [0x90, pitch, 100]
    }

    fn drain_all(s: &mut EventScheduler, block_start: i64, count: usize) -> Vec<RawMidiEvent> {
        let mut out = Vec::new();
        s.drain(block_start, count, |e| out.push(e));
        out
    }

    #[test]
    fn emits_in_due_order() {
        let mut s = EventScheduler::new();
        assert!(s.schedule(300, note_on(64), 3));
        assert!(s.schedule(100, note_on(60), 3));
        assert!(s.schedule(200, note_on(62), 3));
        let out = drain_all(&mut s, 0, 512);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].data[1], 60);
        assert_eq!(out[1].data[1], 62);
        assert_eq!(out[2].data[1], 64);
        assert_eq!(out[0].frame_offset, 100);
        assert!(s.is_empty());
    }

    #[test]
    fn equal_due_samples_keep_insertion_order() {
        let mut s = EventScheduler::new();
        assert!(s.schedule(100, note_on(60), 3));
        assert!(s.schedule(100, note_on(64), 3));
        assert!(s.schedule(100, note_on(67), 3));
        let out = drain_all(&mut s, 0, 512);
        let pitches: Vec<u8> = out.iter().map(|e| e.data[1]).collect();
        assert_eq!(pitches, vec![60, 64, 67]);
    }

    #[test]
    fn future_events_stay_queued() {
        let mut s = EventScheduler::new();
        assert!(s.schedule(600, note_on(60), 3));
        assert!(drain_all(&mut s, 0, 512).is_empty());
        assert_eq!(s.len(), 1);
        let out = drain_all(&mut s, 512, 512);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame_offset, 600 - 512);
    }

    #[test]
    fn overdue_events_clamp_to_block_start() {
        let mut s = EventScheduler::new();
        assert!(s.schedule(-40, note_on(60), 3));
        let out = drain_all(&mut s, 0, 512);
        assert_eq!(out[0].frame_offset, 0);
    }

    #[test]
    fn due_at_block_end_waits_for_next_block() {
        let mut s = EventScheduler::new();
        assert!(s.schedule(512, note_on(60), 3));
        assert!(drain_all(&mut s, 0, 512).is_empty());
        let out = drain_all(&mut s, 512, 512);
        assert_eq!(out[0].frame_offset, 0);
    }

    #[test]
    fn schedule_reports_overflow() {
        let mut s = EventScheduler::new();
        for i in 0..MAX_QUEUED_EVENTS {
            assert!(s.schedule(i as i64, note_on(60), 3));
        }
        assert!(!s.schedule(0, note_on(61), 3));
        assert_eq!(s.len(), MAX_QUEUED_EVENTS);
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut s = EventScheduler::new();
        assert!(s.schedule(10, note_on(60), 3));
        s.clear();
        assert!(s.is_empty());
        assert!(drain_all(&mut s, 0, 512).is_empty());
    }
}
