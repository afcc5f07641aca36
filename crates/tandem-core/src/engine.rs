//! The audio-thread block orchestrator.
//!
//! [`Engine::process_block`] is the single entry point the host calls
//! from its audio callback. Everything it touches is either owned by
//! the engine (fixed-capacity queue, active-note table, matcher state)
//! or reached through an atomic snapshot load, so a block never
//! allocates, locks, or blocks.

use std::sync::Arc;
use std::time::Instant;

use tandem_midi::{EventBuffer, RawEventKind, RawMidiEvent, ReferenceData};

use crate::counters::EngineStats;
use crate::handle::EngineHandle;
use crate::matcher::{ClusterMatcher, MatcherConfig};
use crate::misslog::{miss_log_channel, MissLogEntry, MissLogWriter};
use crate::scheduler::EventScheduler;
use crate::shared::SharedReference;
use crate::tempo::TempoTracker;
use crate::tracker::{ActiveNote, ActiveNoteTable};
use crate::transport::{BlockContext, Transition, TransportWatch};
use crate::velocity::VelocityStatistics;

/// CPU-load EMA smoothing per block.
const LOAD_SMOOTHING: f64 = 0.1;

/// Construction-time engine settings. Per-block values travel in
/// [`Controls`](crate::Controls) instead.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub matcher: MatcherConfig,
    /// How many bars back the tempo-shifted twin snapshot is built.
    pub tempo_shift_bars: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            tempo_shift_bars: 1,
        }
    }
}

/// Create a connected engine / handle pair for one host instance.
///
/// The [`Engine`] moves to the audio thread; the [`EngineHandle`] stays
/// with the host's control surface.
pub fn engine(sample_rate: f64, config: EngineConfig) -> (Engine, EngineHandle) {
    let shared = SharedReference::new();
    let stats = EngineStats::shared();
    let (miss_writer, miss_reader) = miss_log_channel();

    let handle = EngineHandle::new(
        sample_rate,
        config.tempo_shift_bars,
        Arc::clone(&shared),
        Arc::clone(&stats),
        miss_reader,
    );
    let engine = Engine {
        sample_rate,
        shared,
        stats,
        watch: TransportWatch::default(),
        scheduler: EventScheduler::new(),
        active: ActiveNoteTable::new(),
        matcher: ClusterMatcher::new(config.matcher),
        velocity: VelocityStatistics::new(),
        tempo: TempoTracker::new(),
        miss: miss_writer,
        take_start: 0,
        latched_slack: 0,
        fallback_pos: 0,
    };
    (engine, handle)
}

/// Real-time half of the correction engine.
pub struct Engine {
    sample_rate: f64,
    shared: Arc<SharedReference>,
    stats: Arc<EngineStats>,
    watch: TransportWatch,
    scheduler: EventScheduler,
    active: ActiveNoteTable,
    matcher: ClusterMatcher,
    velocity: VelocityStatistics,
    tempo: TempoTracker,
    miss: MissLogWriter,
    /// Absolute sample of the current take's start.
    take_start: i64,
    /// Output latency in samples, latched from `slack_ms` at take start
    /// so a mid-take control change cannot reorder the queue.
    latched_slack: i64,
    /// Free-running position for hosts that report no sample position.
    fallback_pos: i64,
}

impl Engine {
    /// Process one audio block's worth of MIDI.
    ///
    /// `input` events carry in-block frame offsets; corrected output is
    /// appended to `output`, also with in-block offsets.
    pub fn process_block(
        &mut self,
        ctx: &BlockContext,
        input: &[RawMidiEvent],
        output: &mut EventBuffer,
    ) {
        let started = Instant::now();
        let pos = ctx.transport.sample_pos.unwrap_or(self.fallback_pos);

        match self.watch.observe(&ctx.transport, pos) {
            Transition::Started(start) => self.reset_take(start, ctx),
            Transition::Stopped => self.stop_take(),
            Transition::None => {}
        }
        self.stats.is_playing.set(self.watch.is_playing());
        if let Some(bpm) = ctx.transport.bpm {
            self.stats.host_bpm.set(bpm as f32);
        }

        let snapshot = self.shared.active(ctx.controls.tempo_shift);
        match snapshot {
            Some(data) if self.watch.is_playing() && !ctx.controls.bypass => {
                self.correct_block(ctx, pos, &data, input, output);
            }
            _ => self.forward_block(ctx, pos, input, output),
        }

        self.drain_scheduled(ctx, pos, output);

        let timeout = (ctx.controls.missing_timeout_ms as f64 / 1000.0 * self.sample_rate) as i64;
        self.active.evict_stale(pos + ctx.sample_count as i64, timeout);

        if ctx.sample_count > 0 {
            let budget = ctx.sample_count as f64 / self.sample_rate;
            let load = started.elapsed().as_secs_f64() / budget;
            let ema = self.stats.cpu_load.get() as f64;
            self.stats.cpu_load.set((ema + LOAD_SMOOTHING * (load - ema)) as f32);
        }
        self.fallback_pos = pos + ctx.sample_count as i64;
    }

    /// One authoritative reset, fed solely by the transport watch.
    fn reset_take(&mut self, start: i64, ctx: &BlockContext) {
        self.take_start = start;
        self.latched_slack =
            ((ctx.controls.slack_ms.max(0.0) as f64 / 1000.0) * self.sample_rate).round() as i64;
        self.scheduler.clear();
        self.active.clear();
        self.matcher.reset();
        self.velocity.reset();
        self.tempo.reset();
        self.shared.clear_matched();
        self.miss.mark_reset();
        self.stats.reset_take();
    }

    fn stop_take(&mut self) {
        self.scheduler.clear();
        self.active.clear();
    }

    /// Correction path: every input event leaves through the scheduler.
    fn correct_block(
        &mut self,
        ctx: &BlockContext,
        pos: i64,
        data: &ReferenceData,
        input: &[RawMidiEvent],
        output: &mut EventBuffer,
    ) {
        let correction = ctx.controls.correction.clamp(0.0, 1.0) as f64;

        for event in input {
            let raw = pos + event.frame_offset as i64;
            match event.kind() {
                RawEventKind::NoteOn { pitch, velocity } => {
                    self.handle_note_on(ctx, data, *event, raw, pitch, velocity, correction, output);
                }
                RawEventKind::NoteOff { pitch, velocity } => {
                    self.handle_note_off(ctx, data, *event, raw, pitch, velocity, correction, output);
                }
                RawEventKind::Other => {
                    // Non-note traffic keeps the latched latency so its
                    // ordering relative to the notes survives.
                    self.enqueue(ctx, raw + self.latched_slack, *event, output);
                }
            }
        }

        let elapsed = (pos - self.take_start) as f64 / self.sample_rate;
        self.stats
            .reference_bpm
            .set(self.tempo.bpm_at(&data.tempo_events, elapsed) as f32);
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_note_on(
        &mut self,
        ctx: &BlockContext,
        data: &ReferenceData,
        event: RawMidiEvent,
        raw: i64,
        pitch: u8,
        velocity: u8,
        correction: f64,
        output: &mut EventBuffer,
    ) {
        self.stats.notes_in.increment();
        self.capture_start_offset(data, raw);
        self.velocity.observe_live(velocity);

        let channel = event.channel();
        let matched = self.matcher.match_note(
            data,
            pitch,
            channel,
            ctx.controls.pitch_tolerance,
            ctx.controls.extra_note_budget,
        );

        let (due, out_velocity) = match matched {
            Some(index) => {
                self.stats.matched.increment();
                let note = &data.notes[index];
                self.velocity.observe_reference(note.on_velocity);

                let aligned = self.take_start + (note.on_sample - data.first_note_sample);
                self.stats
                    .last_delta_ms
                    .set(((aligned - raw) as f64 / self.sample_rate * 1000.0) as f32);
                let due =
                    raw + ((aligned - raw) as f64 * correction).round() as i64 + self.latched_slack;

                let out_velocity = if ctx.controls.velocity_correction {
                    let live = velocity as f64;
                    let target =
                        (note.on_velocity as f64 * self.velocity.scale()).clamp(1.0, 127.0);
                    (live + (target - live) * correction).round().clamp(1.0, 127.0) as u8
                } else {
                    velocity
                };
                (due, out_velocity)
            }
            None => {
                self.stats.missed.increment();
                self.miss.record(MissLogEntry {
                    sample_time: raw,
                    elapsed_secs: (raw - self.take_start) as f64 / self.sample_rate,
                    pitch,
                    velocity,
                    channel,
                    cluster_cursor: self.matcher.cursor(),
                    correction: ctx.controls.correction,
                    pitch_tolerance: ctx.controls.pitch_tolerance,
                });
                // Unmatched notes still sound, delayed only by the
                // latched slack.
                (raw + self.latched_slack, velocity)
            }
        };

        if !self.active.insert(ActiveNote {
            pitch,
            channel,
            reference_index: matched,
            on_sample: raw,
        }) {
            self.stats.tracking_overflows.increment();
        }

        let corrected = RawMidiEvent::note_on(event.frame_offset, channel, pitch, out_velocity);
        self.enqueue(ctx, due, corrected, output);
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_note_off(
        &mut self,
        ctx: &BlockContext,
        data: &ReferenceData,
        event: RawMidiEvent,
        raw: i64,
        pitch: u8,
        velocity: u8,
        correction: f64,
        output: &mut EventBuffer,
    ) {
        let channel = event.channel();
        let reference_index = self
            .active
            .take(pitch, channel)
            .and_then(|note| note.reference_index);

        // The index was resolved against the snapshot live at note-on
        // time; a reload may have published a smaller one since. A
        // stale index falls back to the uncorrected path.
        let (due, out_velocity) = match reference_index.and_then(|i| data.notes.get(i)) {
            Some(note) => {
                let aligned = self.take_start + (note.off_sample - data.first_note_sample);
                let due =
                    raw + ((aligned - raw) as f64 * correction).round() as i64 + self.latched_slack;
                let out_velocity = if ctx.controls.velocity_correction {
                    let live = velocity as f64;
                    let blended =
                        live + (note.off_velocity as f64 - live) * correction;
                    blended.round().clamp(0.0, 127.0) as u8
                } else {
                    velocity
                };
                (due, out_velocity)
            }
            None => (raw + self.latched_slack, velocity),
        };

        let corrected = RawMidiEvent::note_off(event.frame_offset, channel, pitch, out_velocity);
        self.enqueue(ctx, due, corrected, output);
    }

    /// Schedule an event, or deliver it immediately when the queue is
    /// full. Overload degrades timing, never audibility.
    fn enqueue(&mut self, ctx: &BlockContext, due: i64, event: RawMidiEvent, output: &mut EventBuffer) {
        if !self.scheduler.schedule(due, event.data, event.len) {
            self.stats.queue_overflows.increment();
            self.deliver(ctx, event, output);
        }
    }

    /// Bypass / stopped / no-reference path: input goes out untouched.
    /// Active notes are still tracked so a mid-take bypass toggle does
    /// not orphan their note-offs.
    fn forward_block(
        &mut self,
        ctx: &BlockContext,
        pos: i64,
        input: &[RawMidiEvent],
        output: &mut EventBuffer,
    ) {
        for event in input {
            match event.kind() {
                RawEventKind::NoteOn { pitch, .. } => {
                    self.stats.notes_in.increment();
                    if !self.active.insert(ActiveNote {
                        pitch,
                        channel: event.channel(),
                        reference_index: None,
                        on_sample: pos + event.frame_offset as i64,
                    }) {
                        self.stats.tracking_overflows.increment();
                    }
                }
                RawEventKind::NoteOff { pitch, .. } => {
                    let _ = self.active.take(pitch, event.channel());
                }
                RawEventKind::Other => {}
            }
            self.deliver(ctx, *event, output);
        }
    }

    fn drain_scheduled(&mut self, ctx: &BlockContext, pos: i64, output: &mut EventBuffer) {
        let stats = &self.stats;
        let mute = ctx.controls.mute;
        self.scheduler.drain(pos, ctx.sample_count, |event| {
            if matches!(event.kind(), RawEventKind::NoteOn { .. }) {
                stats.notes_out.increment();
            }
            if !mute {
                output.push(event);
            }
        });
    }

    fn deliver(&mut self, ctx: &BlockContext, event: RawMidiEvent, output: &mut EventBuffer) {
        if matches!(event.kind(), RawEventKind::NoteOn { .. }) {
            self.stats.notes_out.increment();
        }
        if !ctx.controls.mute {
            output.push(event);
        }
    }

    /// Record, once per take, how far into the take the first live
    /// note-on landed relative to where the reference expects it.
    fn capture_start_offset(&mut self, data: &ReferenceData, raw: i64) {
        if self.stats.start_offset_captured.get() {
            return;
        }
        let offset_secs = (raw - self.take_start) as f64 / self.sample_rate;
        self.stats.start_offset_ms.set(offset_secs * 1000.0);
        if data.bar_duration > 0.0 {
            self.stats
                .start_offset_bars
                .set(offset_secs / data.bar_duration);
        }
        self.stats.start_offset_captured.set(true);
    }
}
