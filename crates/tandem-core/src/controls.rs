//! Host-facing control values, read once per block.

/// Named control values handed to the engine by the host collaborator
/// each block. All values are plain data; the engine latches what it
/// must (slack) at take start and reads the rest live.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Controls {
    /// Fixed output latency added to every scheduled event, giving the
    /// correction room to move events earlier without going negative.
    pub slack_ms: f32,
    /// Explicit cluster window for rebuilds (see
    /// [`EngineHandle::rebuild_clusters`](crate::EngineHandle::rebuild_clusters)).
    pub cluster_window_ms: f32,
    /// Blend fraction: 0 = play exactly as performed, 1 = snap fully
    /// to the reference.
    pub correction: f32,
    /// Active live notes older than this without a note-off are
    /// evicted from tracking.
    pub missing_timeout_ms: f32,
    /// Consecutive unmatched notes tolerated before the cluster cursor
    /// is forcibly advanced.
    pub extra_note_budget: u32,
    /// Maximum pitch distance (semitones) for a reference match.
    pub pitch_tolerance: u8,
    /// Scale reference velocities by the live/reference EMA ratio
    /// before blending.
    pub velocity_correction: bool,
    /// Suppress all output while keeping counters and matching live.
    pub mute: bool,
    /// Forward input untouched, skipping correction entirely.
    pub bypass: bool,
    /// Select the tempo-shifted reference snapshot.
    pub tempo_shift: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            slack_ms: 50.0,
            cluster_window_ms: 60.0,
            correction: 1.0,
            missing_timeout_ms: 2000.0,
            extra_note_budget: 3,
            pitch_tolerance: 0,
            velocity_correction: true,
            mute: false,
            bypass: false,
            tempo_shift: false,
        }
    }
}
