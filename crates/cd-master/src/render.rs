//! Offline (faster than real time) rendering.

use cd_engine::{Engine, EngineConfig, Frame, OfflineRuntime, TickOutcome};
use cd_ir::Project;
use tracing::debug;

/// Render `project` from the start until it ends (or `max_seconds` pass),
/// followed by `tail_seconds` of release and effect tails.
pub fn render_frames(
    project: &Project,
    config: &EngineConfig,
    sample_rate: u32,
    max_seconds: f64,
    tail_seconds: f64,
) -> Vec<Frame> {
    let config = config.validated();
    let runtime = OfflineRuntime::with_config(sample_rate, &config);
    let mut engine = Engine::new(runtime, config.clone());
    let max_frames = (max_seconds.max(0.0) * sample_rate as f64) as usize;
    let chunk = ((config.tick_interval * sample_rate as f64) as usize).max(1);
    let mut frames = Vec::with_capacity(max_frames);

    engine.tick(project);
    if engine.play().is_err() {
        return frames;
    }

    while frames.len() < max_frames {
        let report = engine.tick(project);
        if report.outcome == TickOutcome::Ended {
            break;
        }
        let n = chunk.min(max_frames - frames.len());
        let start = frames.len();
        frames.resize(start + n, Frame::silence());
        engine.runtime_mut().render_into(&mut frames[start..]);
        // history is unbounded
        engine.runtime_mut().take_commands();
    }

    let tail = (tail_seconds.max(0.0) * sample_rate as f64) as usize;
    let start = frames.len();
    frames.resize(start + tail, Frame::silence());
    engine.runtime_mut().render_into(&mut frames[start..]);
    debug!(frames = frames.len(), "offline render finished");
    frames
}
