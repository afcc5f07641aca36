//! Immutable reference performance model.
//!
//! A [`ReferenceData`] is built once per file load (or cluster rebuild)
//! and published to the audio thread as a whole snapshot. Nothing in it
//! is mutated while it is live except the matched bitmap, which the
//! audio thread sets bit-by-bit during a take and zeroes on restart.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Fallback tempo when a file carries no tempo meta event.
pub const DEFAULT_BPM: f64 = 120.0;

/// One paired note of the reference performance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceNote {
    pub pitch: u8,
    pub channel: u8,
    pub on_velocity: u8,
    pub off_velocity: u8,
    /// Onset / release in seconds from the start of the file.
    pub on_time: f64,
    pub off_time: f64,
    /// Onset / release resolved against the build sample rate.
    pub on_sample: i64,
    pub off_sample: i64,
}

/// A contiguous run of notes whose onsets fall within the cluster
/// window of the run's *first* onset. The window is anchored at the
/// cluster start, not rolling, so a steady trickle of onsets can grow a
/// cluster past the nominal window. That asymmetry is deliberate: it
/// keeps spread chords and slow arpeggios in one matching unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCluster {
    pub start_index: usize,
    pub note_count: usize,
}

impl ReferenceCluster {
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start_index..self.start_index + self.note_count
    }
}

/// A tempo change in seconds-domain time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTempoEvent {
    pub time: f64,
    pub bpm: f64,
}

/// The complete reference model shared with the audio thread.
#[derive(Debug)]
pub struct ReferenceData {
    pub notes: Vec<ReferenceNote>,
    pub clusters: Vec<ReferenceCluster>,
    /// Sorted, deduplicated by timestamp, never empty.
    pub tempo_events: Vec<ReferenceTempoEvent>,
    /// One bit per note, packed into 64-bit words.
    matched: Vec<AtomicU64>,
    /// Seconds. Window actually used for the cluster partition.
    pub cluster_window: f64,
    /// Seconds per bar, from the first time signature and starting tempo.
    pub bar_duration: f64,
    pub first_note_time: f64,
    pub first_note_sample: i64,
    /// Minimum / median inter-onset interval in seconds (display stats).
    pub min_ioi: f64,
    pub median_ioi: f64,
    /// Sample rate the note sample positions were resolved against.
    pub sample_rate: f64,
}

impl ReferenceData {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        notes: Vec<ReferenceNote>,
        tempo_events: Vec<ReferenceTempoEvent>,
        cluster_window: f64,
        bar_duration: f64,
        min_ioi: f64,
        median_ioi: f64,
        sample_rate: f64,
    ) -> Self {
        let clusters = partition_clusters(&notes, cluster_window);
        let words = notes.len().div_ceil(64);
        let matched = (0..words).map(|_| AtomicU64::new(0)).collect();
        let first_note_time = notes.first().map(|n| n.on_time).unwrap_or(0.0);
        let first_note_sample = notes.first().map(|n| n.on_sample).unwrap_or(0);
        Self {
            notes,
            clusters,
            tempo_events,
            matched,
            cluster_window,
            bar_duration,
            first_note_time,
            first_note_sample,
            min_ioi,
            median_ioi,
            sample_rate,
        }
    }

    /// Rebuild with a different cluster window. Notes and tempo map are
    /// carried over; the matched bitmap starts fresh.
    pub fn with_cluster_window(&self, cluster_window: f64) -> Self {
        Self::new(
            self.notes.clone(),
            self.tempo_events.clone(),
            cluster_window,
            self.bar_duration,
            self.min_ioi,
            self.median_ioi,
            self.sample_rate,
        )
    }

    /// True when the bitmap covers every note. Consulted before any
    /// matched-bit access so a torn snapshot fails safe instead of
    /// indexing out of bounds.
    #[inline]
    pub fn bitmap_valid(&self) -> bool {
        self.matched.len() * 64 >= self.notes.len()
    }

    #[inline]
    pub fn is_matched(&self, index: usize) -> bool {
        match self.matched.get(index / 64) {
            Some(word) => word.load(Ordering::Relaxed) & (1u64 << (index % 64)) != 0,
            None => false,
        }
    }

    #[inline]
    pub fn mark_matched(&self, index: usize) {
        if let Some(word) = self.matched.get(index / 64) {
            word.fetch_or(1u64 << (index % 64), Ordering::Relaxed);
        }
    }

    /// Zero the whole bitmap. Called from the audio thread on every
    /// take restart; touching existing words never allocates.
    pub fn clear_matched(&self) {
        for word in &self.matched {
            word.store(0, Ordering::Relaxed);
        }
    }

    pub fn matched_count(&self) -> usize {
        self.matched
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    /// True when every note of `cluster` has been matched.
    pub fn cluster_satisfied(&self, cluster: &ReferenceCluster) -> bool {
        cluster.range().all(|i| self.is_matched(i))
    }

    pub fn duration(&self) -> f64 {
        self.notes.iter().map(|n| n.off_time).fold(0.0, f64::max)
    }
}

/// Partition `notes` (sorted by onset) into clusters. The window is
/// anchored at each cluster's first onset.
pub fn partition_clusters(notes: &[ReferenceNote], window: f64) -> Vec<ReferenceCluster> {
    let mut clusters = Vec::new();
    let mut start = 0usize;
    while start < notes.len() {
        let anchor = notes[start].on_time;
        let mut end = start + 1;
        while end < notes.len() && notes[end].on_time - anchor <= window {
            end += 1;
        }
        clusters.push(ReferenceCluster {
            start_index: start,
            note_count: end - start,
        });
        start = end;
    }
    clusters
}
