//! RT-safe MIDI event types with sample-accurate block offsets.
//!
//! [`RawMidiEvent`] is the wire shape exchanged with the host each
//! block: up to three message bytes plus an in-block sample offset. It
//! never allocates, so it is safe to build and copy on the audio
//! thread. [`MidiEvent`] is the parsed channel-voice form used at the
//! non-real-time API surface.

use midi_msg::{Channel, ChannelVoiceMsg, MidiMsg};
use smallvec::SmallVec;

/// Per-block output buffer. Inline capacity covers typical blocks
/// without touching the heap.
pub type EventBuffer = SmallVec<[RawMidiEvent; 64]>;

/// Classification of a raw event as seen by the correction engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawEventKind {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8, velocity: u8 },
    /// Any other channel or system message; passed through untouched.
    Other,
}

/// Raw MIDI event: message bytes plus in-block sample offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawMidiEvent {
    /// Offset within the current buffer (0 = first sample).
    pub frame_offset: usize,
    pub data: [u8; 3],
    /// Valid bytes in `data` (1-3).
    pub len: u8,
}

impl RawMidiEvent {
    #[inline]
    pub fn new(frame_offset: usize, data: [u8; 3], len: u8) -> Self {
        Self {
            frame_offset,
            data,
            len,
        }
    }

    #[inline]
    pub fn note_on(frame_offset: usize, channel: u8, pitch: u8, velocity: u8) -> Self {
        Self {
            frame_offset,
            data: [0x90 | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F],
            len: 3,
        }
    }

    #[inline]
    pub fn note_off(frame_offset: usize, channel: u8, pitch: u8, velocity: u8) -> Self {
        Self {
            frame_offset,
            data: [0x80 | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F],
            len: 3,
        }
    }

    /// Status nibble (0x80, 0x90, ...).
    #[inline]
    pub fn status(&self) -> u8 {
        self.data[0] & 0xF0
    }

    /// Channel number (0-15).
    #[inline]
    pub fn channel(&self) -> u8 {
        self.data[0] & 0x0F
    }

    /// Classify without parsing. A NoteOn with velocity 0 is a NoteOff.
    #[inline]
    pub fn kind(&self) -> RawEventKind {
        match self.status() {
            0x90 if self.data[2] > 0 => RawEventKind::NoteOn {
                pitch: self.data[1],
                velocity: self.data[2],
            },
            0x90 => RawEventKind::NoteOff {
                pitch: self.data[1],
                velocity: 0,
            },
            0x80 => RawEventKind::NoteOff {
                pitch: self.data[1],
                velocity: self.data[2],
            },
            _ => RawEventKind::Other,
        }
    }

    /// Copy with a different in-block offset.
    #[inline]
    pub fn at_offset(mut self, frame_offset: usize) -> Self {
        self.frame_offset = frame_offset;
        self
    }

    pub fn to_midi_event(&self) -> Result<MidiEvent, midi_msg::ParseError> {
        MidiEvent::from_bytes_with_offset(&self.data[..self.len as usize], self.frame_offset)
    }
}

/// Parsed channel-voice MIDI event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    pub frame_offset: usize,
    pub channel: Channel,
    pub msg: ChannelVoiceMsg,
}

impl MidiEvent {
    #[inline]
    pub fn new(frame_offset: usize, channel: Channel, msg: ChannelVoiceMsg) -> Self {
        Self {
            frame_offset,
            channel,
            msg,
        }
    }

    #[inline]
    pub fn note_on(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::NoteOn { note, velocity },
        }
    }

    #[inline]
    pub fn note_off(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            frame_offset,
            channel: Channel::from_u8(channel),
            msg: ChannelVoiceMsg::NoteOff { note, velocity },
        }
    }

    #[inline]
    pub fn channel_num(&self) -> u8 {
        self.channel as u8
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        matches!(self.msg, ChannelVoiceMsg::NoteOn { velocity, .. } if velocity > 0)
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        matches!(
            self.msg,
            ChannelVoiceMsg::NoteOff { .. } | ChannelVoiceMsg::NoteOn { velocity: 0, .. }
        )
    }

    #[inline]
    pub fn note(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::NoteOn { note, .. }
            | ChannelVoiceMsg::NoteOff { note, .. }
            | ChannelVoiceMsg::PolyPressure { note, .. } => Some(note),
            _ => None,
        }
    }

    #[inline]
    pub fn velocity(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::NoteOn { velocity, .. }
            | ChannelVoiceMsg::NoteOff { velocity, .. } => Some(velocity),
            _ => None,
        }
    }

    #[inline]
    pub fn to_midi_msg(&self) -> MidiMsg {
        MidiMsg::ChannelVoice {
            channel: self.channel,
            msg: self.msg,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, midi_msg::ParseError> {
        Self::from_bytes_with_offset(bytes, 0)
    }

    pub fn from_bytes_with_offset(
        bytes: &[u8],
        frame_offset: usize,
    ) -> Result<Self, midi_msg::ParseError> {
        let (msg, _len) = MidiMsg::from_midi(bytes)?;
        match msg {
            MidiMsg::ChannelVoice { channel, msg } => Ok(Self {
                frame_offset,
                channel,
                msg,
            }),
            _ => Err(midi_msg::ParseError::Invalid(
                "Expected ChannelVoice message",
            )),
        }
    }

    /// Encode into the raw wire shape without allocating.
    ///
    /// Only the channel-voice messages the engine exchanges with the
    /// host are encoded; anything else collapses to a zero-length raw
    /// event that the engine treats as pass-through noise.
    pub fn to_raw(&self) -> RawMidiEvent {
        let ch = self.channel as u8;
        let (data, len): ([u8; 3], u8) = match self.msg {
            ChannelVoiceMsg::NoteOn { note, velocity } => {
                ([0x90 | ch, note & 0x7F, velocity & 0x7F], 3)
            }
            ChannelVoiceMsg::NoteOff { note, velocity } => {
                ([0x80 | ch, note & 0x7F, velocity & 0x7F], 3)
            }
            ChannelVoiceMsg::PolyPressure { note, pressure } => {
                ([0xA0 | ch, note & 0x7F, pressure & 0x7F], 3)
            }
            ChannelVoiceMsg::ProgramChange { program } => ([0xC0 | ch, program & 0x7F, 0], 2),
            ChannelVoiceMsg::ChannelPressure { pressure } => ([0xD0 | ch, pressure & 0x7F, 0], 2),
            ChannelVoiceMsg::PitchBend { bend } => (
                [0xE0 | ch, (bend & 0x7F) as u8, ((bend >> 7) & 0x7F) as u8],
                3,
            ),
            _ => ([0, 0, 0], 0),
        };
        RawMidiEvent {
            frame_offset: self.frame_offset,
            data,
            len,
        }
    }
}
