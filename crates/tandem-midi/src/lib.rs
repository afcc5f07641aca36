//! MIDI types and the reference performance model for tandem.
//!
//! This crate is the offline half of the system: event representations
//! shared with the real-time engine, plus the `ReferenceBuilder` that
//! parses a Standard MIDI File into an immutable [`ReferenceData`]
//! snapshot (notes, clusters, tempo map, matched bitmap).

pub mod builder;
pub mod error;
pub mod event;
pub mod reference;

pub use builder::{BuildOptions, ReferenceBuilder};
pub use error::{Error, Result};
pub use event::{EventBuffer, MidiEvent, RawEventKind, RawMidiEvent};
pub use reference::{
    ReferenceCluster, ReferenceData, ReferenceNote, ReferenceTempoEvent, DEFAULT_BPM,
};
