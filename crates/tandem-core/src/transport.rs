//! Host transport observation and the take state machine.
//!
//! Stopped→Playing and a backward jump while playing are the single
//! authoritative reset transition; every audio-thread subsystem's
//! `clear` is called from that one point.

use crate::controls::Controls;

/// Host transport state for the current block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransportInfo {
    pub is_playing: bool,
    /// Absolute sample position of the block start, when the host
    /// provides one. Without it the engine free-runs on a block
    /// counter.
    pub sample_pos: Option<i64>,
    pub bpm: Option<f64>,
}

/// Everything the host hands the engine for one callback.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockContext {
    pub sample_count: usize,
    pub transport: TransportInfo,
    pub controls: Controls,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum PlayState {
    #[default]
    Stopped,
    Playing,
}

/// Transition observed at a block boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Transition {
    None,
    /// Stopped→Playing, or a rewind while playing. Carries the sample
    /// position that becomes the take start.
    Started(i64),
    Stopped,
}

/// Tracks the host transport across blocks and reports the reset
/// transition.
#[derive(Debug, Default)]
pub(crate) struct TransportWatch {
    state: PlayState,
    last_pos: i64,
}

impl TransportWatch {
    pub(crate) fn observe(&mut self, info: &TransportInfo, pos: i64) -> Transition {
        let transition = match (self.state, info.is_playing) {
            (PlayState::Stopped, true) => {
                self.state = PlayState::Playing;
                Transition::Started(pos)
            }
            (PlayState::Playing, true) if pos < self.last_pos => {
                // Loop-back or relocate: same reset as a fresh start.
                Transition::Started(pos)
            }
            (PlayState::Playing, false) => {
                self.state = PlayState::Stopped;
                Transition::Stopped
            }
            _ => Transition::None,
        };
        self.last_pos = pos;
        transition
    }

    #[inline]
    pub(crate) fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }
}
