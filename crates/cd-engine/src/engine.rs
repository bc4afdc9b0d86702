//! Engine façade: one cooperative `tick` that reconciles the signal graph
//! with the project, schedules notes and automation, and refreshes meters.

use std::collections::BTreeMap;

use cd_ir::{clamp_pan, clamp_volume, Project, TrackId};
use tracing::{info, warn};

use crate::automation::AutomationEngine;
use crate::config::EngineConfig;
use crate::graph::SignalGraph;
use crate::meter::{Levels, Meters};
use crate::runtime::{AudioRuntime, DeviceError};
use crate::scheduler::{Scheduler, TickOutcome, Window};
use crate::transport::{PlayState, Transport};

/// Mixer values last seen in the project for one track.
#[derive(Clone, Copy, Debug, PartialEq)]
struct SeenMixer {
    volume: f32,
    pan: f32,
}

/// What one tick did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub windows: usize,
    pub notes: usize,
    pub automation: usize,
    /// Transport position after the tick (seconds)
    pub position: f64,
}

pub struct Engine<R: AudioRuntime> {
    runtime: R,
    config: EngineConfig,
    transport: Transport,
    graph: SignalGraph,
    scheduler: Scheduler,
    automation: AutomationEngine,
    meters: Meters,
    /// Windows produced by the current tick
    windows: Vec<Window>,
    seen_mixers: BTreeMap<TrackId, SeenMixer>,
    seen_master: Option<f32>,
    seen_tempo: Option<f64>,
}

impl<R: AudioRuntime> Engine<R> {
    pub fn new(runtime: R, config: EngineConfig) -> Self {
        let config = config.validated();
        Self {
            runtime,
            transport: Transport::default(),
            graph: SignalGraph::new(),
            scheduler: Scheduler::new(),
            automation: AutomationEngine::new(),
            meters: Meters::new(config.meter_window),
            windows: Vec::new(),
            seen_mixers: BTreeMap::new(),
            seen_master: None,
            seen_tempo: None,
            config,
        }
    }

    // --- Transport ---

    /// Start or resume. On device failure the transport stays as it was
    /// and the error is returned.
    pub fn play(&mut self) -> Result<(), DeviceError> {
        let was_playing = self.transport.is_playing();
        let at_end = self.transport.position() >= self.transport.total_duration();
        if let Err(err) = self.transport.play(&mut self.runtime) {
            warn!(%err, "play failed");
            return Err(err);
        }
        if !was_playing && at_end {
            // Playing from the end restarts at zero; a held cursor is stale.
            self.scheduler.rewind(0.0);
        } else {
            self.scheduler.resume_at(self.transport.position_beats());
        }
        Ok(())
    }

    /// Pause. Triggers already issued for the look-ahead window still
    /// sound; the scheduling cursor is kept so nothing repeats on resume.
    pub fn pause(&mut self) {
        self.transport.pause(self.runtime.now());
    }

    pub fn stop(&mut self) {
        self.transport.stop();
        self.scheduler.clear();
    }

    /// Seek to `seconds`; scheduling restarts there on the next tick.
    pub fn seek(&mut self, seconds: f64) -> f64 {
        let position = self.transport.seek(seconds, self.runtime.now());
        self.rewind_if_active();
        position
    }

    pub fn seek_with(&mut self, update: impl FnOnce(f64) -> f64) -> f64 {
        let position = self.transport.seek_with(update, self.runtime.now());
        self.rewind_if_active();
        position
    }

    fn rewind_if_active(&mut self) {
        if self.transport.state() == PlayState::Stopped {
            self.scheduler.clear();
        } else {
            self.scheduler.rewind(self.transport.position_beats());
        }
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        self.transport.set_tempo(bpm, self.runtime.now());
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.transport.set_looping(looping);
    }

    // --- Mixer ---

    pub fn set_track_volume(&mut self, track: TrackId, value: f32) -> bool {
        self.graph.set_volume(track, value, &mut self.runtime)
    }

    pub fn set_track_pan(&mut self, track: TrackId, value: f32) -> bool {
        self.graph.set_pan(track, value, &mut self.runtime)
    }

    pub fn set_master_volume(&mut self, value: f32) {
        self.graph.set_master_volume(value, &mut self.runtime);
    }

    // --- Tick ---

    /// Run one cooperative step against the current project snapshot.
    pub fn tick(&mut self, project: &Project) -> TickReport {
        self.sync_graph(project);
        self.sync_tempo(project);

        let now = self.runtime.now();
        self.windows.clear();
        let windows = &mut self.windows;
        let outcome = self
            .scheduler
            .advance(&mut self.transport, now, &self.config, |w| windows.push(*w));

        let mut notes = 0;
        let mut automation = 0;
        for window in &self.windows {
            notes += self
                .scheduler
                .schedule_notes(window, project, &mut self.graph, &mut self.runtime);
            automation += self
                .automation
                .schedule(window, project, &mut self.graph, &mut self.runtime);
        }
        if outcome == TickOutcome::Ended {
            info!("end of project reached");
        }

        self.meters
            .update(self.transport.is_playing(), &self.graph, &self.runtime);

        TickReport {
            outcome,
            windows: self.windows.len(),
            notes,
            automation,
            position: self.transport.position(),
        }
    }

    /// Reconcile the graph with the project: build graphs for new tracks,
    /// release graphs of removed ones, push mixer and effect changes.
    fn sync_graph(&mut self, project: &Project) {
        self.graph.ensure_master(&mut self.runtime);

        for id in self.graph.track_ids() {
            if project.track(id).is_none() {
                self.graph.remove_track(id, &mut self.runtime);
                self.seen_mixers.remove(&id);
            }
        }

        for track in &project.tracks {
            self.graph.ensure_track_graph(track.id, &mut self.runtime);
            let mixer = SeenMixer {
                volume: clamp_volume(track.mixer.volume),
                pan: clamp_pan(track.mixer.pan),
            };
            let seen = self.seen_mixers.insert(track.id, mixer);
            if seen.map(|s| s.volume) != Some(mixer.volume) {
                self.graph.set_volume(track.id, mixer.volume, &mut self.runtime);
            }
            if seen.map(|s| s.pan) != Some(mixer.pan) {
                self.graph.set_pan(track.id, mixer.pan, &mut self.runtime);
            }
            self.graph
                .sync_effects(track.id, &track.mixer.effects, &mut self.runtime);
        }

        let master = clamp_volume(project.master_volume);
        if self.seen_master != Some(master) {
            self.graph.set_master_volume(master, &mut self.runtime);
            self.seen_master = Some(master);
        }
    }

    fn sync_tempo(&mut self, project: &Project) {
        if self.seen_tempo != Some(project.tempo_bpm) {
            self.seen_tempo = Some(project.tempo_bpm);
            self.set_tempo(project.tempo_bpm);
        }
    }

    /// Release every stage and suspend the device.
    pub fn dispose(&mut self) {
        self.stop();
        self.graph.dispose(&mut self.runtime);
        self.seen_mixers.clear();
        self.seen_master = None;
        self.runtime.suspend();
        info!("engine disposed");
    }

    // --- Accessors ---

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn position(&self) -> f64 {
        self.transport.position()
    }

    pub fn levels(&self) -> &Levels {
        self.meters.levels()
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }
}
