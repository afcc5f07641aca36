//! Reference file parsing.
//!
//! Turns a Standard MIDI File into a [`ReferenceData`] model: all
//! tracks merged into one time-ordered sequence, note-ons paired with
//! their note-offs, tick timestamps resolved to seconds through the
//! file's tempo map, and notes partitioned into onset clusters.
//!
//! This runs on the control thread only, never on the audio path.

use std::collections::HashMap;
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::debug;

use crate::error::{Error, Result};
use crate::reference::{ReferenceData, ReferenceNote, ReferenceTempoEvent, DEFAULT_BPM};

/// Cluster window used when a file has too few onsets to derive one.
pub const FALLBACK_CLUSTER_WINDOW: f64 = 0.05;

/// Fraction of the median inter-onset interval used as the automatic
/// cluster window.
const AUTO_WINDOW_FRACTION: f64 = 0.4;

/// Options for a single build.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuildOptions {
    /// Shift the seconds-domain tempo map back by this many bars.
    /// Used to build the tempo-shifted twin snapshot.
    pub bar_shift: u32,
    /// Explicit cluster window in seconds; derived from the median
    /// inter-onset interval when absent.
    pub cluster_window: Option<f64>,
}

/// Builds [`ReferenceData`] snapshots from MIDI files.
#[derive(Clone, Copy, Debug)]
pub struct ReferenceBuilder {
    sample_rate: f64,
}

#[derive(Clone, Copy)]
enum TickTiming {
    Metrical { ticks_per_beat: f64 },
    Timecode { secs_per_tick: f64 },
}

/// Raw note boundary in absolute ticks, pre-pairing.
#[derive(Clone, Copy)]
struct NoteBoundary {
    tick: u64,
    pitch: u8,
    channel: u8,
    velocity: u8,
    on: bool,
}

impl ReferenceBuilder {
    pub fn new(sample_rate: f64) -> Self {
        Self { sample_rate }
    }

    /// Load and parse a reference file from disk.
    pub fn load(&self, path: impl AsRef<Path>, opts: &BuildOptions) -> Result<ReferenceData> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.display().to_string()),
            _ => Error::Unreadable(format!("{}: {e}", path.display())),
        })?;
        self.parse(&data, opts)
    }

    /// Parse reference MIDI data from bytes.
    pub fn parse(&self, data: &[u8], opts: &BuildOptions) -> Result<ReferenceData> {
        let smf = Smf::parse(data)?;

        let timing = match smf.header.timing {
            Timing::Metrical(tpb) => TickTiming::Metrical {
                ticks_per_beat: tpb.as_int() as f64,
            },
            Timing::Timecode(fps, subframe) => TickTiming::Timecode {
                secs_per_tick: 1.0 / (fps.as_f32() as f64 * subframe as f64),
            },
        };

        // Merge every track into one tick-ordered pool of tempo events,
        // time signatures, and note boundaries.
        let mut tempo_ticks: Vec<(u64, f64)> = Vec::new(); // (tick, us per quarter)
        let mut time_signature: Option<(u64, u8, u8)> = None; // (tick, num, den_pow2)
        let mut boundaries: Vec<NoteBoundary> = Vec::new();

        for track in smf.tracks.iter() {
            let mut tick = 0u64;
            for event in track.iter() {
                tick += event.delta.as_int() as u64;
                match &event.kind {
                    TrackEventKind::Meta(MetaMessage::Tempo(us_per_qn)) => {
                        tempo_ticks.push((tick, us_per_qn.as_int() as f64));
                    }
                    TrackEventKind::Meta(MetaMessage::TimeSignature(num, den_pow2, _, _)) => {
                        let earlier = time_signature.is_none_or(|(t, _, _)| tick < t);
                        if earlier {
                            time_signature = Some((tick, *num, *den_pow2));
                        }
                    }
                    TrackEventKind::Midi { channel, message } => match message {
                        MidiMessage::NoteOn { key, vel } => boundaries.push(NoteBoundary {
                            tick,
                            pitch: key.as_int(),
                            channel: channel.as_int(),
                            velocity: vel.as_int(),
                            // NoteOn with velocity 0 is a note-off.
                            on: vel.as_int() > 0,
                        }),
                        MidiMessage::NoteOff { key, vel } => boundaries.push(NoteBoundary {
                            tick,
                            pitch: key.as_int(),
                            channel: channel.as_int(),
                            velocity: vel.as_int(),
                            on: false,
                        }),
                        _ => {}
                    },
                    _ => {}
                }
            }
        }

        // Deduplicate tempo changes at the same tick; the last one wins,
        // matching how a sequential reader would apply them.
        tempo_ticks.sort_by_key(|&(tick, _)| tick);
        tempo_ticks.dedup_by(|a, b| {
            if a.0 == b.0 {
                b.1 = a.1;
                true
            } else {
                false
            }
        });

        boundaries.sort_by_key(|b| (b.tick, !b.on as u8));

        let notes = self.pair_notes(&boundaries, &tempo_ticks, timing);
        if notes.is_empty() {
            return Err(Error::NoNoteData);
        }

        let mut tempo_events = seconds_tempo_map(&tempo_ticks, timing);
        let bar_duration = bar_duration(time_signature, tempo_events[0].bpm);

        if opts.bar_shift > 0 {
            shift_tempo_map(&mut tempo_events, opts.bar_shift as f64 * bar_duration);
        }

        let (min_ioi, median_ioi) = onset_interval_stats(&notes);
        let cluster_window = opts
            .cluster_window
            .unwrap_or_else(|| match median_ioi {
                m if m > 0.0 => AUTO_WINDOW_FRACTION * m,
                _ => FALLBACK_CLUSTER_WINDOW,
            });

        let data = ReferenceData::new(
            notes,
            tempo_events,
            cluster_window,
            bar_duration,
            min_ioi,
            median_ioi,
            self.sample_rate,
        );

        debug!(
            notes = data.notes.len(),
            clusters = data.clusters.len(),
            tempo_events = data.tempo_events.len(),
            cluster_window_ms = cluster_window * 1000.0,
            bar_duration,
            "built reference model"
        );

        Ok(data)
    }

    /// Pair note-ons with their note-offs, FIFO per (pitch, channel),
    /// and resolve tick timestamps to seconds and samples. Unpaired
    /// note-ons are dropped.
    fn pair_notes(
        &self,
        boundaries: &[NoteBoundary],
        tempo_ticks: &[(u64, f64)],
        timing: TickTiming,
    ) -> Vec<ReferenceNote> {
        let mut open: HashMap<(u8, u8), Vec<usize>> = HashMap::new();
        let mut notes: Vec<ReferenceNote> = Vec::new();

        for b in boundaries {
            let time = ticks_to_seconds(b.tick as f64, tempo_ticks, timing);
            if b.on {
                let index = notes.len();
                notes.push(ReferenceNote {
                    pitch: b.pitch,
                    channel: b.channel,
                    on_velocity: b.velocity,
                    off_velocity: 0,
                    on_time: time,
                    off_time: f64::NAN,
                    on_sample: (time * self.sample_rate).round() as i64,
                    off_sample: 0,
                });
                open.entry((b.pitch, b.channel)).or_default().push(index);
            } else if let Some(stack) = open.get_mut(&(b.pitch, b.channel)) {
                if !stack.is_empty() {
                    let index = stack.remove(0);
                    let note = &mut notes[index];
                    note.off_velocity = b.velocity;
                    note.off_time = time;
                    note.off_sample = (time * self.sample_rate).round() as i64;
                }
            }
        }

        notes.retain(|n| n.off_time.is_finite());
        notes.sort_by(|a, b| a.on_time.total_cmp(&b.on_time));
        notes
    }
}

/// Convert an absolute tick position to seconds by walking the sorted
/// tempo-change list. Before the first tempo event the default 120 BPM
/// (0.5 s per quarter) applies.
fn ticks_to_seconds(tick: f64, tempo_ticks: &[(u64, f64)], timing: TickTiming) -> f64 {
    let ticks_per_beat = match timing {
        TickTiming::Timecode { secs_per_tick } => return tick * secs_per_tick,
        TickTiming::Metrical { ticks_per_beat } => ticks_per_beat,
    };

    let tick_len = 1.0 / ticks_per_beat;
    let mut secs_per_tick = 0.5 * tick_len;
    let mut last_tick = 0.0;
    let mut seconds = 0.0;

    for &(event_tick, us_per_qn) in tempo_ticks {
        let event_tick = event_tick as f64;
        if event_tick >= tick {
            break;
        }
        seconds += (event_tick - last_tick) * secs_per_tick;
        last_tick = event_tick;
        secs_per_tick = tick_len * us_per_qn / 1_000_000.0;
    }

    seconds + (tick - last_tick) * secs_per_tick
}

/// Resolve the tick-domain tempo changes into seconds-domain events.
/// Always yields at least one entry, anchored at time 0.
fn seconds_tempo_map(tempo_ticks: &[(u64, f64)], timing: TickTiming) -> Vec<ReferenceTempoEvent> {
    let mut events: Vec<ReferenceTempoEvent> = tempo_ticks
        .iter()
        .map(|&(tick, us_per_qn)| ReferenceTempoEvent {
            time: ticks_to_seconds(tick as f64, tempo_ticks, timing),
            bpm: 60_000_000.0 / us_per_qn,
        })
        .collect();

    if events.first().is_none_or(|e| e.time > f64::EPSILON) {
        events.insert(
            0,
            ReferenceTempoEvent {
                time: 0.0,
                bpm: DEFAULT_BPM,
            },
        );
    }
    events
}

/// Shift a seconds-domain tempo map back by `shift` seconds, clamping
/// at zero and keeping the later event wherever timestamps collide.
fn shift_tempo_map(events: &mut Vec<ReferenceTempoEvent>, shift: f64) {
    for event in events.iter_mut() {
        event.time = (event.time - shift).max(0.0);
    }
    events.dedup_by(|later, earlier| {
        if (later.time - earlier.time).abs() < 1e-9 {
            earlier.bpm = later.bpm;
            true
        } else {
            false
        }
    });
}

fn bar_duration(time_signature: Option<(u64, u8, u8)>, starting_bpm: f64) -> f64 {
    let (numerator, denominator) = match time_signature {
        Some((_, num, den_pow2)) => (num as f64, (1u32 << den_pow2) as f64),
        None => (4.0, 4.0),
    };
    let beats_per_bar = numerator * 4.0 / denominator;
    beats_per_bar * 60.0 / starting_bpm
}

/// (min, median) of the nonzero intervals between consecutive onsets.
/// Zero-length intervals (chord notes) carry no spacing information,
/// so they are excluded from the statistics.
fn onset_interval_stats(notes: &[ReferenceNote]) -> (f64, f64) {
    let mut intervals: Vec<f64> = notes
        .windows(2)
        .map(|pair| pair[1].on_time - pair[0].on_time)
        .filter(|d| *d > 1e-6)
        .collect();
    if intervals.is_empty() {
        return (0.0, 0.0);
    }
    intervals.sort_by(|a, b| a.total_cmp(b));
    let min = intervals[0];
    let median = intervals[intervals.len() / 2];
    (min, median)
}
