use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cd_engine::{Engine, EngineConfig, Frame, OfflineRuntime};
use cd_ir::{AutomationLane, AutomationParam, Clip, EffectSpec, Note, Project, Track};

/// Eight tracks of sixteenth notes across the whole loop, with automation
/// and a couple of effects.
fn dense_project() -> Project {
    let mut project = Project::new(128.0);
    for id in 0..8u32 {
        let mut clip = Clip::new(1, 0.0, 128.0);
        for step in 0..512 {
            clip = clip.with_note(Note::new(48 + (step % 24) as u8, 100, step as f64 * 0.25, 0.2));
        }
        let mut track = Track::new(id, "lead").with_clip(clip);
        track.mixer.effects = vec![EffectSpec::named("filter"), EffectSpec::named("delay")];
        track.automation.push(
            AutomationLane::new(AutomationParam::Volume)
                .with_point(0.0, 0.2)
                .with_point(64.0, 1.0)
                .with_point(128.0, 0.2),
        );
        project.add_track(track);
    }
    project
}

fn bench_tick(c: &mut Criterion) {
    let project = dense_project();
    let mut engine = Engine::new(OfflineRuntime::new(44100), EngineConfig::default());
    engine.set_looping(true);
    let _ = engine.play();
    engine.tick(&project);

    c.bench_function("scheduler_tick_8_tracks", |b| {
        b.iter(|| {
            engine.runtime_mut().advance(0.025);
            black_box(engine.tick(black_box(&project)));
            engine.runtime_mut().take_commands();
        })
    });
}

fn bench_render(c: &mut Criterion) {
    let project = dense_project();
    let mut engine = Engine::new(OfflineRuntime::new(44100), EngineConfig::default());
    let _ = engine.play();
    engine.tick(&project);
    let mut buf = vec![Frame::silence(); 1024];

    c.bench_function("render_1024_frames", |b| {
        b.iter(|| {
            engine.runtime_mut().render_into(&mut buf);
            black_box(&buf);
        })
    });
}

criterion_group!(benches, bench_tick, bench_render);
criterion_main!(benches);
