//! Real-time MIDI performance correction engine.
//!
//! The engine consumes the host's per-block MIDI input, matches each
//! live note against a pre-recorded reference performance, blends
//! timing and velocity toward the reference, and emits the corrected
//! events at precisely scheduled sample positions.
//!
//! Two execution contexts share exactly one object: the reference
//! snapshot, published whole via an atomic pointer swap. Everything the
//! audio callback owns (queue, active-note table, cluster cursor,
//! velocity averages, miss log producer) is fixed-capacity and never
//! allocates, blocks, or locks.

pub mod controls;
pub mod counters;
pub mod engine;
pub mod error;
pub mod handle;
pub mod lockfree;
pub mod matcher;
pub mod misslog;
pub mod scheduler;
pub mod shared;
pub mod tempo;
pub mod tracker;
pub mod transport;
pub mod velocity;

pub use controls::Controls;
pub use counters::{EngineStats, StatsSnapshot};
pub use engine::{engine, Engine, EngineConfig};
pub use error::{Error, Result};
pub use handle::{EngineHandle, ReferenceDisplay, ReferenceStats, ReferenceSummary, StartOffset};
pub use lockfree::{AtomicCounter, AtomicDouble, AtomicFlag, AtomicFloat};
pub use matcher::{ClusterMatcher, MatcherConfig};
pub use misslog::{MissLogEntry, MAX_MISS_ENTRIES};
pub use scheduler::{EventScheduler, ScheduledMidiEvent, MAX_QUEUED_EVENTS};
pub use tempo::TempoTracker;
pub use tracker::{ActiveNote, ActiveNoteTable, MAX_ACTIVE_NOTES};
pub use transport::{BlockContext, TransportInfo};
pub use velocity::VelocityStatistics;
