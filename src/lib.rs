//! # Tandem - Real-time MIDI Performance Correction
//!
//! Tandem matches a live MIDI performance against a pre-recorded
//! reference and nudges (or snaps) each note's timing and velocity
//! toward it, emitting the corrected events at sample-accurate
//! positions.
//!
//! ## Architecture
//!
//! Tandem is an umbrella crate coordinating:
//! - **tandem-midi** - event types, reference file parsing, the
//!   immutable reference model (notes, clusters, tempo map)
//! - **tandem-core** - the real-time engine: matching, scheduling,
//!   transport watching, statistics, miss logging
//!
//! ## Quick Start
//!
//! ```ignore
//! use tandem::prelude::*;
//!
//! // One engine per host instance; the Engine moves to the audio
//! // thread, the handle stays with the control surface.
//! let (mut engine, handle) = tandem::engine(48_000.0, EngineConfig::default());
//!
//! handle.load_reference("performance.mid")?;
//!
//! // In the audio callback:
//! let mut output = EventBuffer::new();
//! engine.process_block(&ctx, &input_events, &mut output);
//! ```

/// Re-export of tandem-core for direct access.
pub use tandem_core as core;

/// Re-export of tandem-midi for direct access.
pub use tandem_midi as midi;

// Engine surface
pub use tandem_core::{
    engine,
    // Per-block inputs
    BlockContext,
    Controls,
    Engine,
    EngineConfig,
    EngineHandle,
    // Errors
    Error,
    // Matching
    MatcherConfig,
    // Miss log
    MissLogEntry,
    // Query surface
    ReferenceDisplay,
    ReferenceStats,
    ReferenceSummary,
    Result,
    StartOffset,
    StatsSnapshot,
    TransportInfo,
};

// Event and reference types
pub use tandem_midi::{
    BuildOptions, EventBuffer, MidiEvent, RawEventKind, RawMidiEvent, ReferenceBuilder,
    ReferenceCluster, ReferenceData, ReferenceNote, ReferenceTempoEvent,
};

/// Everything most hosts need.
pub mod prelude {
    pub use tandem_core::{
        engine, BlockContext, Controls, Engine, EngineConfig, EngineHandle, TransportInfo,
    };
    pub use tandem_midi::{EventBuffer, RawEventKind, RawMidiEvent};
}
