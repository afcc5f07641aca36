//! Live-note to reference-note matching.
//!
//! The matcher keeps a cursor over the reference's cluster partition
//! and only ever considers unmatched notes from the cursor forward.
//! Consecutive misses past the configured budget force the cursor on
//! by one cluster: a resilience heuristic that trades a few possible
//! false misses for never desynchronizing permanently.

use tandem_midi::ReferenceData;

/// Tunable matcher heuristics fixed at engine construction.
#[derive(Clone, Copy, Debug)]
pub struct MatcherConfig {
    /// How many clusters past the cursor to search before declaring a
    /// miss.
    pub lookahead_clusters: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            lookahead_clusters: 3,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClusterMatcher {
    cursor: usize,
    miss_streak: u32,
    config: MatcherConfig,
}

// MatcherConfig derives Default, but keep an explicit constructor so
// the engine can thread its config through.
impl ClusterMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            cursor: 0,
            miss_streak: 0,
            config,
        }
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.miss_streak = 0;
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Try to claim a reference note for a live note-on.
    ///
    /// On success the note's matched bit is set before the index is
    /// returned, so the same index can never be handed out twice in
    /// one take. `extra_note_budget` is the consecutive-miss streak
    /// tolerated before the cursor is forcibly advanced one cluster.
    pub fn match_note(
        &mut self,
        data: &ReferenceData,
        pitch: u8,
        channel: u8,
        pitch_tolerance: u8,
        extra_note_budget: u32,
    ) -> Option<usize> {
        // A snapshot whose bitmap does not cover its notes (mid-rebuild)
        // must fail safe, not index out of bounds.
        if !data.bitmap_valid() || self.cursor >= data.clusters.len() {
            return None;
        }

        // The cluster at the cursor first.
        if let Some(index) = self.find_in_cluster(data, self.cursor, pitch, channel, pitch_tolerance)
        {
            data.mark_matched(index);
            self.advance_past_satisfied(data);
            self.miss_streak = 0;
            return Some(index);
        }

        // Bounded lookahead: the performer may be ahead of a stalled
        // cursor. A hit jumps the cursor to that cluster.
        let end = (self.cursor + 1 + self.config.lookahead_clusters).min(data.clusters.len());
        for cluster_index in self.cursor + 1..end {
            if let Some(index) =
                self.find_in_cluster(data, cluster_index, pitch, channel, pitch_tolerance)
            {
                data.mark_matched(index);
                self.cursor = cluster_index;
                self.advance_past_satisfied(data);
                self.miss_streak = 0;
                return Some(index);
            }
        }

        // Cluster miss.
        self.miss_streak += 1;
        if self.miss_streak > extra_note_budget {
            self.cursor = (self.cursor + 1).min(data.clusters.len());
            self.miss_streak = 0;
        }
        None
    }

    fn find_in_cluster(
        &self,
        data: &ReferenceData,
        cluster_index: usize,
        pitch: u8,
        channel: u8,
        pitch_tolerance: u8,
    ) -> Option<usize> {
        let cluster = data.clusters.get(cluster_index)?;
        cluster.range().find(|&i| {
            let note = &data.notes[i];
            !data.is_matched(i)
                && note.channel == channel
                && note.pitch.abs_diff(pitch) <= pitch_tolerance
        })
    }

    /// Move the cursor past every fully-matched cluster at its front.
    fn advance_past_satisfied(&mut self, data: &ReferenceData) {
        while self.cursor < data.clusters.len()
            && data.cluster_satisfied(&data.clusters[self.cursor])
        {
            self.cursor += 1;
        }
    }
}
