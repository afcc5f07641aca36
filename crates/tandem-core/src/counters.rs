//! Display statistics shared between the audio and control contexts.

use std::sync::Arc;

use serde::Serialize;

use crate::lockfree::{AtomicCounter, AtomicDouble, AtomicFlag, AtomicFloat};

/// Atomically published engine statistics. Written by the audio
/// thread, read by the control side; relaxed ordering throughout, these
/// are display numbers only.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub notes_in: AtomicCounter,
    pub notes_out: AtomicCounter,
    pub matched: AtomicCounter,
    pub missed: AtomicCounter,
    pub queue_overflows: AtomicCounter,
    pub tracking_overflows: AtomicCounter,

    pub last_delta_ms: AtomicFloat,
    pub cpu_load: AtomicFloat,
    pub host_bpm: AtomicFloat,
    pub reference_bpm: AtomicFloat,

    pub start_offset_ms: AtomicDouble,
    pub start_offset_bars: AtomicDouble,
    pub start_offset_captured: AtomicFlag,

    pub is_playing: AtomicFlag,
}

impl EngineStats {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Per-take reset, called from the audio thread. The monotonic
    /// note counters deliberately survive it.
    pub fn reset_take(&self) {
        self.last_delta_ms.set(0.0);
        self.start_offset_ms.set(0.0);
        self.start_offset_bars.set(0.0);
        self.start_offset_captured.set(false);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            notes_in: self.notes_in.get(),
            notes_out: self.notes_out.get(),
            matched: self.matched.get(),
            missed: self.missed.get(),
            queue_overflows: self.queue_overflows.get(),
            tracking_overflows: self.tracking_overflows.get(),
            last_delta_ms: self.last_delta_ms.get(),
            cpu_load: self.cpu_load.get(),
            host_bpm: self.host_bpm.get(),
            reference_bpm: self.reference_bpm.get(),
        }
    }
}

/// Point-in-time copy of the counters for the query surface.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StatsSnapshot {
    pub notes_in: u64,
    pub notes_out: u64,
    pub matched: u64,
    pub missed: u64,
    pub queue_overflows: u64,
    pub tracking_overflows: u64,
    pub last_delta_ms: f32,
    pub cpu_load: f32,
    pub host_bpm: f32,
    pub reference_bpm: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = EngineStats::default();
        stats.notes_in.increment();
        stats.notes_in.increment();
        stats.matched.increment();
        stats.last_delta_ms.set(-12.5);
        let snap = stats.snapshot();
        assert_eq!(snap.notes_in, 2);
        assert_eq!(snap.matched, 1);
        assert_eq!(snap.last_delta_ms, -12.5);
    }

    #[test]
    fn take_reset_keeps_monotonic_counters() {
        let stats = EngineStats::default();
        stats.notes_in.increment();
        stats.start_offset_captured.set(true);
        stats.reset_take();
        assert_eq!(stats.notes_in.get(), 1);
        assert!(!stats.start_offset_captured.get());
    }
}
