//! End-to-end correction scenarios driven through the public surface:
//! a reference MIDI file goes in, live events are fed block by block,
//! and the corrected output is checked against the reference grid.

use midly::{
    num::{u15, u24, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use tandem::prelude::*;
use tandem::{engine, EngineConfig, RawEventKind, RawMidiEvent};

const SR: f64 = 48000.0;
const BLOCK: usize = 512;
const TPB: u32 = 480;

fn note_event(delta: u32, on: bool, pitch: u8, vel: u8) -> TrackEvent<'static> {
    let message = if on {
        MidiMessage::NoteOn {
            key: u7::new(pitch),
            vel: u7::new(vel),
        }
    } else {
        MidiMessage::NoteOff {
            key: u7::new(pitch),
            vel: u7::new(vel),
        }
    };
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message,
        },
    }
}

/// 120 BPM: quarter notes at 0.0s (pitch 60) and 0.5s (pitch 64).
fn two_note_file() -> Vec<u8> {
    let smf = Smf {
        header: Header::new(Format::SingleTrack, Timing::Metrical(u15::new(TPB as u16))),
        tracks: vec![vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000))),
            },
            note_event(0, true, 60, 100),
            note_event(TPB / 2, false, 60, 0),
            note_event(TPB / 2, true, 64, 90),
            note_event(TPB / 2, false, 64, 0),
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ]],
    };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).unwrap();
    bytes
}

fn rig() -> (Engine, EngineHandle) {
    let (engine, handle) = engine(SR, EngineConfig::default());
    handle.load_reference_from(&two_note_file()).unwrap();
    (engine, handle)
}

fn snap_controls() -> Controls {
    Controls {
        slack_ms: 0.0,
        correction: 1.0,
        velocity_correction: false,
        ..Controls::default()
    }
}

fn ctx(playing: bool, pos: i64, controls: Controls) -> BlockContext {
    BlockContext {
        sample_count: BLOCK,
        transport: TransportInfo {
            is_playing: playing,
            sample_pos: Some(pos),
            bpm: Some(120.0),
        },
        controls,
    }
}

/// Feed `input` on the first block, then run empty blocks to `to`.
/// Returns (absolute sample, event) for everything emitted.
fn run(
    engine: &mut Engine,
    controls: Controls,
    from: i64,
    to: i64,
    mut input: Vec<RawMidiEvent>,
) -> Vec<(i64, RawMidiEvent)> {
    let mut emitted = Vec::new();
    let mut pos = from;
    while pos < to {
        let mut out = EventBuffer::new();
        engine.process_block(&ctx(true, pos, controls), &input, &mut out);
        input.clear();
        emitted.extend(out.into_iter().map(|e| (pos, e)));
        pos += BLOCK as i64;
    }
    emitted
}

fn note_on_samples(emitted: &[(i64, RawMidiEvent)]) -> Vec<i64> {
    emitted
        .iter()
        .filter(|(_, e)| matches!(e.kind(), RawEventKind::NoteOn { .. }))
        .map(|(pos, e)| pos + e.frame_offset as i64)
        .collect()
}

#[test]
fn sloppy_performance_snaps_to_the_reference() {
    let (mut engine, handle) = rig();
    let controls = snap_controls();
    // Both notes early and bunched together.
    let input = vec![
        RawMidiEvent::note_on(0, 0, 60, 110),
        RawMidiEvent::note_on(200, 0, 64, 70),
    ];
    let emitted = run(&mut engine, controls, 0, 48000, input);

    assert_eq!(note_on_samples(&emitted), vec![0, 24000]);
    let stats = handle.snapshot();
    assert_eq!(stats.matched, 2);
    assert_eq!(stats.missed, 0);
    assert_eq!(stats.notes_in, 2);
    assert_eq!(stats.notes_out, 2);
}

#[test]
fn half_correction_lands_half_way() {
    let (mut engine, _handle) = rig();
    let controls = Controls {
        correction: 0.5,
        ..snap_controls()
    };
    // Second reference note expected at 24000; played at 20000.
    let mut emitted = Vec::new();
    let mut fed_first = false;
    let mut fed_second = false;
    let mut pos = 0i64;
    while pos < 48000 {
        let mut input = Vec::new();
        if !fed_first {
            input.push(RawMidiEvent::note_on(0, 0, 60, 100));
            fed_first = true;
        }
        if !fed_second && pos <= 20000 && 20000 < pos + BLOCK as i64 {
            input.push(RawMidiEvent::note_on((20000 - pos) as usize, 0, 64, 90));
            fed_second = true;
        }
        let mut out = EventBuffer::new();
        engine.process_block(&ctx(true, pos, controls), &input, &mut out);
        emitted.extend(out.into_iter().map(|e| (pos, e)));
        pos += BLOCK as i64;
    }
    // 20000 + (24000 - 20000) * 0.5 = 22000.
    assert_eq!(note_on_samples(&emitted), vec![0, 22000]);
}

#[test]
fn zero_correction_only_adds_slack() {
    let (mut engine, _handle) = rig();
    let controls = Controls {
        slack_ms: 10.0, // 480 samples
        correction: 0.0,
        velocity_correction: false,
        ..Controls::default()
    };
    let input = vec![RawMidiEvent::note_on(137, 0, 60, 110)];
    let emitted = run(&mut engine, controls, 0, 4096, input);
    assert_eq!(note_on_samples(&emitted), vec![137 + 480]);
}

#[test]
fn unmatched_pitch_is_logged_and_passes_through() {
    let (mut engine, handle) = rig();
    let controls = snap_controls();
    let input = vec![RawMidiEvent::note_on(10, 0, 99, 80)];
    let emitted = run(&mut engine, controls, 0, 4096, input);

    assert_eq!(note_on_samples(&emitted), vec![10]);
    let stats = handle.snapshot();
    assert_eq!(stats.missed, 1);
    assert_eq!(stats.matched, 0);

    let misses = handle.misses();
    assert_eq!(misses.len(), 1);
    assert_eq!(misses[0].pitch, 99);
    assert!(handle.miss_report().contains("1 missed note(s)"));
}

#[test]
fn note_offs_follow_the_reference_releases() {
    let (mut engine, _handle) = rig();
    let controls = snap_controls();
    let input = vec![
        RawMidiEvent::note_on(0, 0, 60, 100),
        RawMidiEvent::note_off(150, 0, 60, 0),
    ];
    let emitted = run(&mut engine, controls, 0, 48000, input);
    let offs: Vec<i64> = emitted
        .iter()
        .filter(|(_, e)| matches!(e.kind(), RawEventKind::NoteOff { .. }))
        .map(|(pos, e)| pos + e.frame_offset as i64)
        .collect();
    // The reference holds the first note for 0.25s.
    assert_eq!(offs, vec![12000]);
}

#[test]
fn queue_overflow_degrades_to_immediate_passthrough() {
    let (mut engine, handle) = rig();
    let controls = Controls {
        slack_ms: 100.0, // far past the first block
        correction: 0.0,
        velocity_correction: false,
        ..Controls::default()
    };
    // 300 unmatched notes in one block: 256 fit the queue, the rest
    // must come out immediately instead of being dropped.
    let input: Vec<RawMidiEvent> = (0..300)
        .map(|i| RawMidiEvent::note_on(i % BLOCK, 0, 99, 80))
        .collect();
    let mut first_block = EventBuffer::new();
    engine.process_block(&ctx(true, 0, controls), &input, &mut first_block);

    let overflowed = first_block
        .iter()
        .filter(|e| matches!(e.kind(), RawEventKind::NoteOn { .. }))
        .count();
    assert_eq!(overflowed, 300 - 256);
    assert_eq!(handle.snapshot().queue_overflows, 300 - 256);

    // The queued remainder drains once the slack elapses.
    let emitted = run(&mut engine, controls, BLOCK as i64, 48000, Vec::new());
    let drained = emitted
        .iter()
        .filter(|(_, e)| matches!(e.kind(), RawEventKind::NoteOn { .. }))
        .count();
    assert_eq!(drained, 256);
    assert_eq!(handle.snapshot().notes_out, 300);
}

#[test]
fn rewind_starts_a_fresh_take() {
    let (mut engine, handle) = rig();
    let controls = snap_controls();
    let input = vec![
        RawMidiEvent::note_on(0, 0, 60, 100),
        RawMidiEvent::note_on(50, 0, 99, 80), // one miss
    ];
    run(&mut engine, controls, 0, 2048, input);
    assert_eq!(handle.misses().len(), 1);

    // Rewind to zero while playing: same reset as a fresh start.
    let mut out = EventBuffer::new();
    engine.process_block(&ctx(true, 0, controls), &[], &mut out);

    assert!(handle.misses().is_empty());
    assert!(handle.start_offset().is_none());

    // The first reference note is claimable again.
    let input = vec![RawMidiEvent::note_on(0, 0, 60, 100)];
    run(&mut engine, controls, 0, 2048, input);
    assert_eq!(handle.snapshot().matched, 2);
}

#[test]
fn start_offset_reports_where_the_performer_came_in() {
    let (mut engine, handle) = rig();
    let controls = snap_controls();
    assert!(handle.start_offset().is_none());

    // First note one block into the take.
    let mut out = EventBuffer::new();
    engine.process_block(&ctx(true, 0, controls), &[], &mut out);
    let input = [RawMidiEvent::note_on(0, 0, 60, 100)];
    engine.process_block(&ctx(true, BLOCK as i64, controls), &input, &mut out);

    let offset = handle.start_offset().unwrap();
    let expected_ms = BLOCK as f64 / SR * 1000.0;
    assert!((offset.ms - expected_ms).abs() < 1e-6);
    // 4/4 at 120 BPM: 2 seconds per bar.
    assert!((offset.bars - expected_ms / 2000.0).abs() < 1e-9);
}

#[test]
fn stopping_quiets_the_engine() {
    let (mut engine, handle) = rig();
    let controls = snap_controls();
    let slow = Controls {
        slack_ms: 500.0,
        ..controls
    };
    let input = vec![RawMidiEvent::note_on(0, 0, 60, 100)];
    let mut out = EventBuffer::new();
    engine.process_block(&ctx(true, 0, slow), &input, &mut out);
    assert!(out.is_empty()); // still queued behind the slack

    // Stop: pending events are discarded, input passes through.
    let mut out = EventBuffer::new();
    let input = vec![RawMidiEvent::note_on(9, 0, 64, 70)];
    engine.process_block(&ctx(false, BLOCK as i64, slow), &input, &mut out);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].frame_offset, 9);
    assert!(!handle.snapshot().last_delta_ms.is_nan());
}

#[test]
fn cluster_rebuild_widens_the_matching_unit() {
    let (mut engine, handle) = rig();
    let controls = snap_controls();
    assert_eq!(handle.reference_stats().unwrap().clusters, 2);
    // 600ms window swallows the 500ms gap: both notes become one
    // chord-like cluster and may arrive in either order.
    handle.rebuild_clusters(600.0).unwrap();
    assert_eq!(handle.reference_stats().unwrap().clusters, 1);

    let input = vec![
        RawMidiEvent::note_on(0, 0, 64, 90), // second note first
        RawMidiEvent::note_on(10, 0, 60, 100),
    ];
    run(&mut engine, controls, 0, 48000, input);
    assert_eq!(handle.snapshot().matched, 2);
    assert_eq!(handle.snapshot().missed, 0);
}

#[test]
fn file_roundtrip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reference.mid");
    std::fs::write(&path, two_note_file()).unwrap();

    let (_engine, handle) = engine(SR, EngineConfig::default());
    handle.load_reference(&path).unwrap();
    let summary = loop {
        if let Some(summary) = handle.poll_load().unwrap() {
            break summary;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    };
    assert_eq!(summary.notes, 2);
    assert!((summary.bar_duration_secs - 2.0).abs() < 1e-9);
    assert!(handle.is_reference_loaded());

    // Persisted state re-triggers the load.
    let state = handle.save_state().unwrap();
    let (_engine2, restored) = engine(SR, EngineConfig::default());
    restored.restore_state(&state).unwrap();
    while restored.poll_load().unwrap().is_none() {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert!(restored.is_reference_loaded());
}
