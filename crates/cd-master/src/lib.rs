//! Headless controller for the cadence sequencer.
//!
//! Owns the project snapshot, the playback engine and the capture
//! lifecycle, and exposes the API a host (editor UI, CLI) drives.

mod capture;
mod render;

use std::sync::Arc;

use cd_audio::{CpalInput, CpalRuntime};
use cd_engine::{AudioRuntime, CaptureSession, CaptureSource, Engine};
use tracing::{info, warn};

// Re-export common types so callers don't need cd-ir/cd-engine directly.
pub use capture::CaptureFinalizer;
pub use cd_engine::wav::{encode_wav, frames_to_wav, write_wav};
pub use cd_engine::{
    CaptureAsset, CaptureError, DeviceError, EngineConfig, Frame, Levels, PlayState, TickReport,
};
pub use cd_ir::{Edit, Project, TrackId};
pub use render::render_frames;

type SourceFactory = Box<dyn FnMut() -> Result<Box<dyn CaptureSource>, DeviceError>>;

/// Headless controller: owns a project and manages playback and capture.
pub struct Controller<R: AudioRuntime = CpalRuntime> {
    project: Arc<Project>,
    engine: Engine<R>,
    capture: Option<CaptureSession>,
    open_source: SourceFactory,
}

impl Controller<CpalRuntime> {
    /// Controller on the default output and input devices. Devices are
    /// acquired on first `play` / `start_capture`.
    pub fn new(config: EngineConfig) -> Self {
        let runtime = CpalRuntime::new(config.validated());
        Self::with_runtime(runtime, config)
            .with_capture_source(|| Ok(Box::new(CpalInput::new()) as Box<dyn CaptureSource>))
    }
}

impl<R: AudioRuntime> Controller<R> {
    /// Controller on a caller-supplied runtime, with no capture device.
    pub fn with_runtime(runtime: R, config: EngineConfig) -> Self {
        Self {
            project: Arc::new(Project::default()),
            engine: Engine::new(runtime, config),
            capture: None,
            open_source: Box::new(|| Err(DeviceError::NoDevice)),
        }
    }

    /// Use `factory` to open an input whenever capture starts.
    pub fn with_capture_source(
        mut self,
        factory: impl FnMut() -> Result<Box<dyn CaptureSource>, DeviceError> + 'static,
    ) -> Self {
        self.open_source = Box::new(factory);
        self
    }

    // --- Project ---

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Cheap shared handle to the current snapshot.
    pub fn snapshot(&self) -> Arc<Project> {
        Arc::clone(&self.project)
    }

    /// Replace the whole project. Playback continues against the new
    /// snapshot from the next tick.
    pub fn load_project(&mut self, project: Project) {
        self.replace_project(Arc::new(project));
    }

    pub fn replace_project(&mut self, project: Arc<Project>) {
        info!(tracks = project.tracks.len(), tempo = project.tempo_bpm, "project loaded");
        self.project = project;
    }

    /// Apply a host change event. Returns whether anything changed.
    pub fn apply_edit(&mut self, edit: &Edit) -> bool {
        Arc::make_mut(&mut self.project).apply(edit)
    }

    // --- Transport ---

    pub fn play(&mut self) -> Result<(), DeviceError> {
        self.engine.play()
    }

    pub fn pause(&mut self) {
        self.engine.pause();
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    pub fn seek(&mut self, seconds: f64) -> f64 {
        self.engine.seek(seconds)
    }

    pub fn seek_with(&mut self, update: impl FnOnce(f64) -> f64) -> f64 {
        self.engine.seek_with(update)
    }

    /// Change tempo on the project; playback follows on the next tick.
    pub fn set_tempo(&mut self, bpm: f64) -> bool {
        self.apply_edit(&Edit::SetTempo { bpm })
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.engine.set_looping(looping);
    }

    // --- Mixer ---

    /// Instant volume jump, recorded in the project.
    pub fn set_track_volume(&mut self, track: TrackId, value: f32) -> bool {
        let known = self.apply_edit(&Edit::SetVolume { track, volume: value });
        self.engine.set_track_volume(track, value) || known
    }

    pub fn set_track_pan(&mut self, track: TrackId, value: f32) -> bool {
        let known = self.apply_edit(&Edit::SetPan { track, pan: value });
        self.engine.set_track_pan(track, value) || known
    }

    pub fn set_master_volume(&mut self, value: f32) {
        self.apply_edit(&Edit::SetMasterVolume { volume: value });
        self.engine.set_master_volume(value);
    }

    // --- Tick ---

    /// One cooperative step: scheduling, automation, meters, and capture
    /// buffering.
    pub fn tick(&mut self) -> TickReport {
        let report = self.engine.tick(&self.project);
        if let Some(session) = self.capture.as_mut() {
            session.pump();
        }
        report
    }

    // --- Capture ---

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Open the input and start a fresh capture buffer. On failure no
    /// capture state is kept.
    pub fn start_capture(&mut self) -> Result<(), CaptureError> {
        if self.capture.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }
        let source = (self.open_source)()?;
        match CaptureSession::start(source) {
            Ok(session) => {
                self.capture = Some(session);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "capture start failed");
                Err(err)
            }
        }
    }

    /// Close the input and finalize the recording in the background. Await
    /// the returned finalizer for the asset.
    pub fn stop_capture(&mut self) -> Result<CaptureFinalizer, CaptureError> {
        let session = self.capture.take().ok_or(CaptureError::NotCapturing)?;
        CaptureFinalizer::spawn(session.finish())
    }

    // --- State ---

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    pub fn state(&self) -> PlayState {
        self.engine.transport().state()
    }

    /// Transport position in seconds.
    pub fn position(&self) -> f64 {
        self.engine.position()
    }

    pub fn levels(&self) -> &Levels {
        self.engine.levels()
    }

    pub fn engine(&self) -> &Engine<R> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<R> {
        &mut self.engine
    }

    /// Tear down: drop any capture, release every stage, suspend output.
    pub fn dispose(&mut self) {
        if let Some(session) = self.capture.take() {
            session.finish();
        }
        self.engine.dispose();
    }

    // --- Offline rendering ---

    pub fn render_frames(&self, sample_rate: u32, max_seconds: f64) -> Vec<Frame> {
        render_frames(
            &self.project,
            self.engine.config(),
            sample_rate,
            max_seconds,
            self.engine.config().release_time,
        )
    }

    pub fn render_to_wav(&self, sample_rate: u32, max_seconds: f64) -> Vec<u8> {
        frames_to_wav(&self.render_frames(sample_rate, max_seconds), sample_rate)
    }
}
