//! End-to-end scheduling behavior against the offline runtime.
//!
//! The offline device clock only moves when audio is rendered, so each
//! test drives the engine with an explicit tick-then-render loop.

use cd_engine::frequency::pitch_to_frequency;
use cd_engine::{AudioRuntime, Engine, EngineConfig, OfflineRuntime, StageCommand, StageId};
use cd_ir::{Clip, Note, Project, Track, TrackId};

const SAMPLE_RATE: u32 = 1000;

fn engine() -> Engine<OfflineRuntime> {
    Engine::new(OfflineRuntime::new(SAMPLE_RATE), EngineConfig::default())
}

/// One note per beat, each with its own pitch so triggers can be told apart.
fn ladder(bpm: f64, beats: u8) -> Project {
    let mut clip = Clip::new(1, 0.0, beats as f64);
    for i in 0..beats {
        clip = clip.with_note(Note::new(48 + i, 100, i as f64, 0.25));
    }
    let mut p = Project::new(bpm);
    p.add_track(Track::new(1, "lead").with_clip(clip));
    p
}

fn run(e: &mut Engine<OfflineRuntime>, p: &Project, seconds: f64, tick: f64) {
    let steps = (seconds / tick).round() as usize;
    for _ in 0..steps {
        e.tick(p);
        e.runtime_mut().advance(tick);
    }
}

/// `(dest, frequency, start)` for every trigger submitted so far.
fn triggers(e: &Engine<OfflineRuntime>) -> Vec<(StageId, f32, f64)> {
    e.runtime()
        .commands()
        .iter()
        .filter_map(|c| match c {
            StageCommand::Trigger { dest, voice } => Some((*dest, voice.frequency, voice.start)),
            _ => None,
        })
        .collect()
}

fn count_pitch(e: &Engine<OfflineRuntime>, pitch: u8) -> usize {
    let f = pitch_to_frequency(pitch);
    triggers(e).iter().filter(|(_, freq, _)| (freq - f).abs() < 0.01).count()
}

fn start_of(e: &Engine<OfflineRuntime>, pitch: u8) -> Vec<f64> {
    let f = pitch_to_frequency(pitch);
    triggers(e)
        .iter()
        .filter(|(_, freq, _)| (freq - f).abs() < 0.01)
        .map(|t| t.2)
        .collect()
}

fn gain_of(e: &Engine<OfflineRuntime>, track: TrackId) -> StageId {
    e.graph().track(track).map(|t| t.gain).unwrap()
}

#[test]
fn every_note_fires_once_at_any_tick_rate() {
    for tick in [0.005, 0.01, 0.025, 0.04] {
        let p = ladder(120.0, 8);
        let mut e = engine();
        e.tick(&p);
        e.play().unwrap();
        run(&mut e, &p, 3.0, tick);

        for beat in 0..=5u8 {
            let starts = start_of(&e, 48 + beat);
            assert_eq!(starts.len(), 1, "beat {beat} at tick {tick}");
            assert!((starts[0] - beat as f64 * 0.5).abs() < 1e-9, "beat {beat} at tick {tick}");
        }
        assert_eq!(count_pitch(&e, 48 + 7), 0, "beyond the look-ahead at tick {tick}");
    }
}

#[test]
fn late_tick_catches_up_without_gaps() {
    let p = ladder(120.0, 8);
    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 0.5, 0.025);
    // A stalled scheduler thread.
    e.runtime_mut().advance(0.7);
    run(&mut e, &p, 1.0, 0.025);

    for beat in 0..=4u8 {
        assert_eq!(count_pitch(&e, 48 + beat), 1, "beat {beat}");
    }
}

#[test]
fn pause_and_resume_neither_repeats_nor_skips() {
    let p = ladder(120.0, 8);
    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 1.2, 0.025);

    e.pause();
    let before = triggers(&e).len();
    run(&mut e, &p, 1.0, 0.025);
    assert_eq!(triggers(&e).len(), before, "nothing is scheduled while paused");

    e.play().unwrap();
    run(&mut e, &p, 1.5, 0.025);
    for beat in 0..=5u8 {
        assert_eq!(count_pitch(&e, 48 + beat), 1, "beat {beat}");
    }
    // Resumed notes are shifted by the time spent paused.
    let start = start_of(&e, 48 + 4)[0];
    assert!((start - 3.0).abs() < 1e-6, "beat 4 starts at {start}");
}

#[test]
fn stop_rewinds_and_replays_from_zero() {
    let p = ladder(120.0, 4);
    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 0.3, 0.025);
    e.stop();
    assert_eq!(e.position(), 0.0);
    assert!(e.scheduler().next_beat().is_none());

    e.play().unwrap();
    run(&mut e, &p, 0.3, 0.025);
    assert_eq!(count_pitch(&e, 48), 2);
}

#[test]
fn seek_skips_the_gap_and_starts_at_the_target() {
    let p = ladder(120.0, 8);
    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 0.5, 0.025);

    let now = e.runtime().now();
    assert_eq!(e.seek(2.0), 2.0);
    run(&mut e, &p, 0.5, 0.025);

    assert_eq!(count_pitch(&e, 48 + 2), 0);
    assert_eq!(count_pitch(&e, 48 + 3), 0);
    let starts = start_of(&e, 48 + 4);
    assert_eq!(starts.len(), 1);
    assert!((starts[0] - now).abs() < 1e-9);
}

#[test]
fn loop_wraps_to_the_top_of_the_grid() {
    // 240 BPM puts the 128-beat grid at 32 seconds.
    let mut p = Project::new(240.0);
    p.add_track(
        Track::new(1, "lead")
            .with_clip(Clip::new(1, 0.0, 4.0).with_note(Note::new(60, 100, 0.0, 0.5)))
            .with_clip(Clip::new(2, 127.0, 1.0).with_note(Note::new(72, 100, 0.0, 0.5))),
    );
    let mut e = engine();
    e.set_looping(true);
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 33.0, 0.025);

    assert!(e.is_playing());
    let tail = start_of(&e, 72);
    assert_eq!(tail.len(), 1);
    assert!((tail[0] - 31.75).abs() < 1e-6);

    let heads = start_of(&e, 60);
    assert_eq!(heads.len(), 2);
    assert!(heads[0].abs() < 1e-9);
    assert!((heads[1] - 32.0).abs() < 1e-6, "wrapped start {}", heads[1]);
    assert!(e.position() < 2.0);
}

#[test]
fn playback_ends_at_the_grid_without_loop() {
    let p = ladder(240.0, 1);
    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 33.0, 0.05);
    assert!(!e.is_playing());
    assert_eq!(count_pitch(&e, 48), 1);
}

#[test]
fn tempo_change_keeps_the_beat_and_stretches_what_follows() {
    let mut p = ladder(120.0, 8);
    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 2.0, 0.025);

    // Beat 4 at 120 BPM; the next tick picks up the new tempo.
    p.tempo_bpm = 96.0;
    run(&mut e, &p, 2.0, 0.025);

    assert_eq!(e.transport().tempo(), 96.0);
    for beat in 0..=6u8 {
        assert_eq!(count_pitch(&e, 48 + beat), 1, "beat {beat}");
    }
    let six = start_of(&e, 48 + 6)[0];
    assert!((six - (2.0 + 2.0 * 0.625)).abs() < 1e-6, "beat 6 starts at {six}");
}

#[test]
fn solo_silences_other_tracks() {
    let mut p = Project::new(120.0);
    for id in 1..=2 {
        let clip = Clip::new(1, 0.0, 4.0).with_note(Note::new(60, 100, 0.0, 0.5));
        p.add_track(Track::new(id, "lead").with_clip(clip));
    }
    p.track_mut(2).unwrap().mixer.is_solo = true;

    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 0.2, 0.025);

    let soloed = gain_of(&e, 2);
    let fired = triggers(&e);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].0, soloed);
}

#[test]
fn muted_track_stays_silent() {
    let mut p = ladder(120.0, 4);
    p.track_mut(1).unwrap().mixer.is_muted = true;
    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 1.0, 0.025);
    assert!(triggers(&e).is_empty());
}

#[test]
fn notes_are_cut_at_the_clip_edge() {
    let mut p = Project::new(120.0);
    let clip = Clip::new(1, 0.0, 1.0)
        .with_note(Note::new(60, 100, 0.5, 4.0))
        .with_note(Note::new(62, 100, 1.5, 0.5));
    p.add_track(Track::new(1, "lead").with_clip(clip));

    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 1.0, 0.025);

    let fired: Vec<_> = e
        .runtime()
        .commands()
        .iter()
        .filter_map(|c| match c {
            StageCommand::Trigger { voice, .. } => Some(*voice),
            _ => None,
        })
        .collect();
    assert_eq!(fired.len(), 1);
    assert!((fired[0].start - 0.25).abs() < 1e-9);
    assert!((fired[0].stop - 0.5).abs() < 1e-9);
}

#[test]
fn device_failure_leaves_engine_stopped() {
    let p = ladder(120.0, 4);
    let mut e = Engine::new(OfflineRuntime::disconnected(SAMPLE_RATE), EngineConfig::default());
    e.tick(&p);
    assert!(e.play().is_err());
    assert!(!e.is_playing());
    let report = e.tick(&p);
    assert_eq!(report.notes, 0);
    assert!(triggers(&e).is_empty());
}

#[test]
fn rendered_audio_follows_the_schedule() {
    let p = ladder(120.0, 2);
    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();

    let mut frames = Vec::new();
    for _ in 0..40 {
        e.tick(&p);
        frames.extend(e.runtime_mut().render(25));
    }
    // First note sounds from 0.0 to 0.125, second starts at 0.5.
    let loud = |range: std::ops::Range<usize>| frames[range].iter().any(|f| f.left.abs() > 0.05);
    assert!(loud(0..100));
    assert!(!loud(200..480));
    assert!(loud(500..600));
}

#[test]
fn resume_after_seeking_to_the_end_restarts_from_the_top() {
    let mut p = Project::new(120.0);
    p.add_track(Track::new(1, "lead").with_clip(Clip::new(1, 0.0, 4.0).with_note(Note::new(60, 100, 1.0, 0.5))));
    let mut e = engine();
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 0.02, 0.02);

    e.pause();
    e.seek(1000.0);
    e.play().unwrap();
    assert_eq!(e.position(), 0.0);
    assert_eq!(e.scheduler().next_beat(), Some(0.0));

    run(&mut e, &p, 2.0, 0.02);
    assert!(e.is_playing());
    assert_eq!(count_pitch(&e, 60), 1);
}

#[test]
fn stalled_tick_across_the_loop_point_drops_nothing() {
    // 240 BPM: 0.25 s per beat, 32 s loop.
    let mut p = Project::new(240.0);
    p.add_track(
        Track::new(1, "lead")
            .with_clip(Clip::new(1, 0.0, 4.0).with_note(Note::new(60, 100, 0.0, 0.5)))
            .with_clip(Clip::new(2, 127.0, 1.0).with_note(Note::new(72, 100, 0.9, 0.05))),
    );
    let mut e = engine();
    e.set_looping(true);
    e.tick(&p);
    e.play().unwrap();
    run(&mut e, &p, 31.85, 0.025);
    e.tick(&p);
    assert_eq!(count_pitch(&e, 72), 0);

    // The scheduling thread stalls past the loop end.
    e.runtime_mut().advance(0.3);
    run(&mut e, &p, 0.5, 0.025);

    let tail = start_of(&e, 72);
    assert_eq!(tail.len(), 1);
    assert!((tail[0] - 31.975).abs() < 1e-6);
    let heads = start_of(&e, 60);
    assert_eq!(heads.len(), 2);
    assert!((heads[1] - 32.0).abs() < 1e-6);
}
