//! Level metering.

use std::collections::BTreeMap;

use cd_ir::TrackId;

use crate::graph::SignalGraph;
use crate::runtime::AudioRuntime;

/// Latest RMS levels for every track meter and the master meter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Levels {
    pub tracks: BTreeMap<TrackId, f32>,
    pub master: f32,
}

impl Levels {
    pub fn track(&self, id: TrackId) -> f32 {
        self.tracks.get(&id).copied().unwrap_or(0.0)
    }
}

/// Samples meter stages and publishes RMS levels.
#[derive(Debug)]
pub struct Meters {
    scratch: Vec<f32>,
    levels: Levels,
}

impl Meters {
    pub fn new(window: usize) -> Self {
        Self {
            scratch: vec![0.0; window.max(1)],
            levels: Levels::default(),
        }
    }

    pub fn levels(&self) -> &Levels {
        &self.levels
    }

    /// Refresh every level. When not playing all levels are zero.
    pub fn update<R: AudioRuntime>(
        &mut self,
        playing: bool,
        graph: &SignalGraph,
        runtime: &R,
    ) -> &Levels {
        self.levels.tracks.retain(|id, _| graph.track(*id).is_some());
        for (id, handles) in graph.tracks() {
            let level = if playing {
                self.measure(handles.meter, runtime)
            } else {
                0.0
            };
            self.levels.tracks.insert(id, level);
        }
        self.levels.master = match graph.master() {
            Some(master) if playing => self.measure(master.meter, runtime),
            _ => 0.0,
        };
        &self.levels
    }

    fn measure<R: AudioRuntime>(&mut self, stage: crate::runtime::StageId, runtime: &R) -> f32 {
        let n = runtime.read_meter(stage, &mut self.scratch);
        rms(&self.scratch[..n])
    }
}

/// Root-mean-square amplitude; zero for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::OfflineRuntime;
    use crate::runtime::{StageCommand, VoiceTrigger, Waveform};

    #[test]
    fn rms_of_constant() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn levels_follow_signal_and_zero_when_stopped() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        let gain = graph.ensure_track_graph(7, &mut rt).gain;
        rt.submit(StageCommand::Trigger {
            dest: gain,
            voice: VoiceTrigger {
                frequency: 1.0,
                amplitude: 1.0,
                start: 0.0,
                stop: 10.0,
                waveform: Waveform::Square,
            },
        });
        rt.advance(0.2);

        let mut meters = Meters::new(64);
        let levels = meters.update(true, &graph, &rt).clone();
        assert!((levels.track(7) - 1.0).abs() < 1e-3, "got {}", levels.track(7));
        assert!(levels.master > 0.0);

        let levels = meters.update(false, &graph, &rt);
        assert_eq!(levels.track(7), 0.0);
        assert_eq!(levels.master, 0.0);
    }

    #[test]
    fn removed_tracks_drop_out() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        graph.ensure_track_graph(1, &mut rt);
        let mut meters = Meters::new(64);
        meters.update(true, &graph, &rt);
        assert!(meters.levels().tracks.contains_key(&1));
        graph.remove_track(1, &mut rt);
        meters.update(true, &graph, &rt);
        assert!(meters.levels().tracks.is_empty());
    }
}
