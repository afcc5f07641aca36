//! Miss log: audio→control channel for unmatched live notes.
//!
//! The audio thread records each miss into a lock-free SPSC ring; the
//! control side drains it into a bounded per-take list and formats the
//! textual report. A reset marker in the same ring clears the list at
//! take boundaries, so clearing never crosses threads.

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use serde::Serialize;

/// Ring capacity between the two threads.
const CHANNEL_CAPACITY: usize = 256;

/// Most entries kept per take on the control side.
pub const MAX_MISS_ENTRIES: usize = 128;

/// One unmatched live note, with the control values and matcher state
/// in effect when it was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MissLogEntry {
    /// Absolute sample of the live note-on.
    pub sample_time: i64,
    /// Seconds since the take started.
    pub elapsed_secs: f64,
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
    pub cluster_cursor: usize,
    pub correction: f32,
    pub pitch_tolerance: u8,
}

#[derive(Clone, Copy, Debug)]
enum MissLogMsg {
    /// Take boundary: discard everything collected so far.
    Reset,
    Entry(MissLogEntry),
}

/// Audio-thread half.
pub struct MissLogWriter {
    producer: HeapProd<MissLogMsg>,
}

impl MissLogWriter {
    /// Record a miss. Returns `false` when the ring is full; the entry
    /// is lost, which only degrades the report, never the audio path.
    #[inline]
    pub fn record(&mut self, entry: MissLogEntry) -> bool {
        self.producer.try_push(MissLogMsg::Entry(entry)).is_ok()
    }

    /// Mark a take boundary.
    #[inline]
    pub fn mark_reset(&mut self) {
        let _ = self.producer.try_push(MissLogMsg::Reset);
    }
}

/// Control-thread half.
pub struct MissLogReader {
    consumer: HeapCons<MissLogMsg>,
    entries: Vec<MissLogEntry>,
}

impl MissLogReader {
    /// Drain pending messages into the per-take list.
    pub fn poll(&mut self) {
        while let Some(msg) = self.consumer.try_pop() {
            match msg {
                MissLogMsg::Reset => self.entries.clear(),
                MissLogMsg::Entry(entry) => {
                    if self.entries.len() < MAX_MISS_ENTRIES {
                        self.entries.push(entry);
                    }
                }
            }
        }
    }

    pub fn entries(&mut self) -> &[MissLogEntry] {
        self.poll();
        &self.entries
    }

    /// Discard everything collected and pending. Used when the
    /// reference itself is replaced, which invalidates old misses.
    pub fn clear(&mut self) {
        while self.consumer.try_pop().is_some() {}
        self.entries.clear();
    }

    /// Human-readable report for the current take.
    pub fn report(&mut self) -> String {
        self.poll();
        if self.entries.is_empty() {
            return "no misses recorded".to_string();
        }
        let mut out = String::with_capacity(self.entries.len() * 64);
        out.push_str(&format!("{} missed note(s)\n", self.entries.len()));
        for entry in &self.entries {
            out.push_str(&format!(
                "  t={:.3}s pitch={} vel={} ch={} cursor={} correction={:.2}\n",
                entry.elapsed_secs,
                entry.pitch,
                entry.velocity,
                entry.channel,
                entry.cluster_cursor,
                entry.correction,
            ));
        }
        out
    }
}

/// Create the connected writer/reader pair.
pub fn miss_log_channel() -> (MissLogWriter, MissLogReader) {
    let rb = HeapRb::new(CHANNEL_CAPACITY);
    let (producer, consumer) = rb.split();
    (
        MissLogWriter { producer },
        MissLogReader {
            consumer,
            entries: Vec::with_capacity(MAX_MISS_ENTRIES),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pitch: u8, elapsed: f64) -> MissLogEntry {
        MissLogEntry {
            sample_time: (elapsed * 48000.0) as i64,
            elapsed_secs: elapsed,
            pitch,
            velocity: 100,
            channel: 0,
            cluster_cursor: 0,
            correction: 1.0,
            pitch_tolerance: 0,
        }
    }

    #[test]
    fn entries_flow_across_the_channel() {
        let (mut writer, mut reader) = miss_log_channel();
        assert!(writer.record(entry(60, 0.5)));
        assert!(writer.record(entry(64, 1.0)));
        let entries = reader.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pitch, 60);
    }

    #[test]
    fn reset_marker_clears_the_take() {
        let (mut writer, mut reader) = miss_log_channel();
        assert!(writer.record(entry(60, 0.5)));
        reader.poll();
        writer.mark_reset();
        assert!(writer.record(entry(72, 0.1)));
        let entries = reader.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pitch, 72);
    }

    #[test]
    fn report_lists_misses() {
        let (mut writer, mut reader) = miss_log_channel();
        assert_eq!(reader.report(), "no misses recorded");
        assert!(writer.record(entry(61, 2.25)));
        let report = reader.report();
        assert!(report.contains("1 missed note(s)"));
        assert!(report.contains("pitch=61"));
    }

    #[test]
    fn clear_discards_collected_and_pending() {
        let (mut writer, mut reader) = miss_log_channel();
        assert!(writer.record(entry(60, 0.5)));
        reader.poll();
        assert!(writer.record(entry(64, 1.0))); // still in the ring
        reader.clear();
        assert!(reader.entries().is_empty());
    }

    #[test]
    fn per_take_list_is_bounded() {
        let (mut writer, mut reader) = miss_log_channel();
        for _ in 0..MAX_MISS_ENTRIES {
            assert!(writer.record(entry(60, 0.0)));
            reader.poll();
        }
        assert!(writer.record(entry(99, 0.0)));
        assert_eq!(reader.entries().len(), MAX_MISS_ENTRIES);
    }
}
