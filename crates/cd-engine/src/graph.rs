//! Signal graph manager: per-track processing chains feeding a shared
//! master chain.
//!
//! Each track owns `gain → pan → [enabled effects] → meter`, and every
//! track meter feeds `master gain → master meter → output`. The chain is
//! strictly serial and effect order is preserved.

use std::collections::BTreeMap;

use cd_ir::{clamp_pan, clamp_volume, EffectKind, EffectSpec, TrackId};
use tracing::{debug, warn};

use crate::runtime::{AudioRuntime, StageCommand, StageId, StageKind};

/// Hands out stage ids, reusing released ones.
#[derive(Clone, Debug, Default)]
struct StageIds {
    next: StageId,
    free: Vec<StageId>,
}

impl StageIds {
    fn allocate(&mut self) -> StageId {
        self.free.pop().unwrap_or_else(|| {
            let id = self.next;
            self.next += 1;
            id
        })
    }

    fn recycle(&mut self, id: StageId) {
        self.free.push(id);
    }
}

/// An effect stage in a track chain.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectStage {
    pub kind: EffectKind,
    pub stage: StageId,
    /// Parameters as last sent to the runtime
    pub params: BTreeMap<String, f32>,
}

/// Runtime handles for one track.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackGraph {
    pub gain: StageId,
    pub pan: StageId,
    pub effects: Vec<EffectStage>,
    pub meter: StageId,
    /// Effect list the chain was last built from
    built_from: Vec<EffectSpec>,
}

impl TrackGraph {
    /// Every stage owned by this track, in signal order.
    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ {
        [self.gain, self.pan]
            .into_iter()
            .chain(self.effects.iter().map(|e| e.stage))
            .chain(core::iter::once(self.meter))
    }
}

/// Handles for the shared master chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MasterGraph {
    pub gain: StageId,
    pub meter: StageId,
    pub output: StageId,
}

/// What a call to [`SignalGraph::sync_effects`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectSync {
    Unchanged,
    /// Only parameter values changed; sent as tweaks.
    Tweaked,
    /// The list shape changed; the chain was rebuilt.
    Rebuilt,
    /// No such track.
    Stale,
}

/// Builds and owns every stage the engine has created in the runtime.
#[derive(Debug, Default)]
pub struct SignalGraph {
    tracks: BTreeMap<TrackId, TrackGraph>,
    master: Option<MasterGraph>,
    ids: StageIds,
}

impl SignalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn create<R: AudioRuntime>(&mut self, runtime: &mut R, kind: StageKind) -> StageId {
        let id = self.ids.allocate();
        runtime.submit(StageCommand::Create { id, kind });
        id
    }

    fn release<R: AudioRuntime>(&mut self, runtime: &mut R, id: StageId) {
        runtime.submit(StageCommand::Release { id });
        self.ids.recycle(id);
    }

    /// Build the master chain on first use.
    pub fn ensure_master<R: AudioRuntime>(&mut self, runtime: &mut R) -> MasterGraph {
        if let Some(master) = self.master {
            return master;
        }
        let gain = self.create(runtime, StageKind::Gain);
        let meter = self.create(runtime, StageKind::Meter);
        let output = self.create(runtime, StageKind::Output);
        runtime.submit(StageCommand::Connect { from: gain, to: meter });
        runtime.submit(StageCommand::Connect { from: meter, to: output });
        let master = MasterGraph { gain, meter, output };
        self.master = Some(master);
        master
    }

    /// Return the track's handles, building `gain → pan → meter → master`
    /// if this is the first reference. Never builds twice.
    pub fn ensure_track_graph<R: AudioRuntime>(
        &mut self,
        track: TrackId,
        runtime: &mut R,
    ) -> &TrackGraph {
        if !self.tracks.contains_key(&track) {
            let master = self.ensure_master(runtime);
            let gain = self.create(runtime, StageKind::Gain);
            let pan = self.create(runtime, StageKind::Pan);
            let meter = self.create(runtime, StageKind::Meter);
            runtime.submit(StageCommand::Connect { from: gain, to: pan });
            runtime.submit(StageCommand::Connect { from: pan, to: meter });
            runtime.submit(StageCommand::Connect { from: meter, to: master.gain });
            debug!(track, gain, pan, meter, "track graph built");
            self.tracks.insert(
                track,
                TrackGraph {
                    gain,
                    pan,
                    effects: Vec::new(),
                    meter,
                    built_from: Vec::new(),
                },
            );
        }
        &self.tracks[&track]
    }

    /// Tear down the track's effect stages and rebuild the chain from the
    /// enabled entries of `effects`, in list order. Unknown effect names are
    /// skipped. Returns false for an unknown track.
    pub fn rebuild_effects_chain<R: AudioRuntime>(
        &mut self,
        track: TrackId,
        effects: &[EffectSpec],
        runtime: &mut R,
    ) -> bool {
        let Some(graph) = self.tracks.get_mut(&track) else {
            warn!(track, "effects rebuild for unknown track ignored");
            return false;
        };
        let (pan, meter) = (graph.pan, graph.meter);
        let old = core::mem::take(&mut graph.effects);
        graph.built_from = effects.to_vec();

        runtime.submit(StageCommand::Disconnect { from: pan });
        for effect in old {
            runtime.submit(StageCommand::Disconnect { from: effect.stage });
            self.release(runtime, effect.stage);
        }

        let mut built = Vec::new();
        let mut prev = pan;
        for spec in effects.iter().filter(|e| e.enabled) {
            let Some(kind) = spec.kind() else {
                warn!(track, effect = spec.name.as_str(), "unknown effect skipped");
                continue;
            };
            let params = kind.resolve_params(&spec.parameters);
            let stage = self.create(
                runtime,
                StageKind::Effect {
                    kind,
                    params: params.clone(),
                },
            );
            runtime.submit(StageCommand::Connect { from: prev, to: stage });
            built.push(EffectStage { kind, stage, params });
            prev = stage;
        }
        runtime.submit(StageCommand::Connect { from: prev, to: meter });
        debug!(track, stages = built.len(), "effects chain rebuilt");

        if let Some(graph) = self.tracks.get_mut(&track) {
            graph.effects = built;
        }
        true
    }

    /// Bring the track's chain in line with `effects`: rebuild when the
    /// list shape (names, order, enabled flags) differs from what was
    /// built, otherwise send changed parameter values in place.
    pub fn sync_effects<R: AudioRuntime>(
        &mut self,
        track: TrackId,
        effects: &[EffectSpec],
        runtime: &mut R,
    ) -> EffectSync {
        let Some(graph) = self.tracks.get(&track) else {
            return EffectSync::Stale;
        };
        if graph.built_from == effects {
            return EffectSync::Unchanged;
        }
        if !same_shape(&graph.built_from, effects) {
            self.rebuild_effects_chain(track, effects, runtime);
            return EffectSync::Rebuilt;
        }

        let Some(graph) = self.tracks.get_mut(&track) else {
            return EffectSync::Stale;
        };
        let known = effects
            .iter()
            .filter(|e| e.enabled)
            .filter_map(|e| e.kind().map(|k| (k, e)));
        for (stage, (kind, spec)) in graph.effects.iter_mut().zip(known) {
            let wanted = kind.resolve_params(&spec.parameters);
            for (name, value) in &wanted {
                if stage.params.get(name) != Some(value) {
                    runtime.submit(StageCommand::SetParam {
                        id: stage.stage,
                        param: name.clone(),
                        value: *value,
                    });
                }
            }
            stage.params = wanted;
        }
        graph.built_from = effects.to_vec();
        EffectSync::Tweaked
    }

    /// Jump a track's gain. Clamped to [0, 1].
    pub fn set_volume<R: AudioRuntime>(&mut self, track: TrackId, value: f32, runtime: &mut R) -> bool {
        let Some(graph) = self.tracks.get(&track) else {
            warn!(track, "volume change for unknown track ignored");
            return false;
        };
        runtime.submit(StageCommand::SetValue {
            id: graph.gain,
            value: clamp_volume(value),
        });
        true
    }

    /// Jump a track's pan. Clamped to [-1, 1].
    pub fn set_pan<R: AudioRuntime>(&mut self, track: TrackId, value: f32, runtime: &mut R) -> bool {
        let Some(graph) = self.tracks.get(&track) else {
            warn!(track, "pan change for unknown track ignored");
            return false;
        };
        runtime.submit(StageCommand::SetValue {
            id: graph.pan,
            value: clamp_pan(value),
        });
        true
    }

    /// Jump the master gain. Clamped to [0, 1].
    pub fn set_master_volume<R: AudioRuntime>(&mut self, value: f32, runtime: &mut R) {
        let master = self.ensure_master(runtime);
        runtime.submit(StageCommand::SetValue {
            id: master.gain,
            value: clamp_volume(value),
        });
    }

    /// Release every stage belonging to a track.
    pub fn remove_track<R: AudioRuntime>(&mut self, track: TrackId, runtime: &mut R) -> bool {
        let Some(graph) = self.tracks.remove(&track) else {
            return false;
        };
        for stage in graph.stages() {
            self.release(runtime, stage);
        }
        debug!(track, "track graph released");
        true
    }

    /// Release every stage, master included.
    pub fn dispose<R: AudioRuntime>(&mut self, runtime: &mut R) {
        let tracks: Vec<TrackId> = self.tracks.keys().copied().collect();
        for track in tracks {
            self.remove_track(track, runtime);
        }
        if let Some(master) = self.master.take() {
            for stage in [master.gain, master.meter, master.output] {
                self.release(runtime, stage);
            }
        }
    }

    pub fn track(&self, track: TrackId) -> Option<&TrackGraph> {
        self.tracks.get(&track)
    }

    pub fn tracks(&self) -> impl Iterator<Item = (TrackId, &TrackGraph)> {
        self.tracks.iter().map(|(id, g)| (*id, g))
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect()
    }

    pub fn master(&self) -> Option<MasterGraph> {
        self.master
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.master.is_none()
    }
}

/// Same names in the same order with the same enabled flags.
fn same_shape(a: &[EffectSpec], b: &[EffectSpec]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.name == y.name && x.enabled == y.enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::OfflineRuntime;

    fn connections(rt: &OfflineRuntime) -> Vec<(StageId, StageId)> {
        rt.commands()
            .iter()
            .filter_map(|c| match c {
                StageCommand::Connect { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    fn creates(rt: &OfflineRuntime) -> usize {
        rt.commands()
            .iter()
            .filter(|c| matches!(c, StageCommand::Create { .. }))
            .count()
    }

    #[test]
    fn ensure_track_graph_is_idempotent() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        let first = graph.ensure_track_graph(1, &mut rt).clone();
        let second = graph.ensure_track_graph(1, &mut rt).clone();
        assert_eq!(first, second);
        // master (3) + track (3)
        assert_eq!(creates(&rt), 6);
    }

    #[test]
    fn track_chain_feeds_master() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        let t = graph.ensure_track_graph(1, &mut rt).clone();
        let m = graph.master().unwrap();
        let conns = connections(&rt);
        assert!(conns.contains(&(t.gain, t.pan)));
        assert!(conns.contains(&(t.pan, t.meter)));
        assert!(conns.contains(&(t.meter, m.gain)));
        assert!(conns.contains(&(m.gain, m.meter)));
        assert!(conns.contains(&(m.meter, m.output)));
    }

    #[test]
    fn rebuild_preserves_order_and_skips_disabled_and_unknown() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        graph.ensure_track_graph(1, &mut rt);
        let effects = vec![
            EffectSpec::new(EffectKind::Equalizer),
            EffectSpec::named("vocoder"),
            EffectSpec::new(EffectKind::Delay).disabled(),
            EffectSpec::new(EffectKind::Compressor),
        ];
        assert!(graph.rebuild_effects_chain(1, &effects, &mut rt));
        let t = graph.track(1).unwrap().clone();
        let kinds: Vec<_> = t.effects.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EffectKind::Equalizer, EffectKind::Compressor]);

        let conns = connections(&rt);
        let (eq, comp) = (t.effects[0].stage, t.effects[1].stage);
        assert!(conns.ends_with(&[(t.pan, eq), (eq, comp), (comp, t.meter)]));
    }

    #[test]
    fn rebuild_releases_previous_effect_stages() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        graph.ensure_track_graph(1, &mut rt);
        graph.rebuild_effects_chain(1, &[EffectSpec::new(EffectKind::Reverb)], &mut rt);
        let old = graph.track(1).unwrap().effects[0].stage;
        rt.take_commands();
        graph.rebuild_effects_chain(1, &[], &mut rt);
        assert!(rt.commands().contains(&StageCommand::Release { id: old }));
        let t = graph.track(1).unwrap();
        assert!(t.effects.is_empty());
        assert_eq!(
            rt.commands().last(),
            Some(&StageCommand::Connect { from: t.pan, to: t.meter })
        );
    }

    #[test]
    fn parameter_change_tweaks_without_rebuild() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        graph.ensure_track_graph(1, &mut rt);
        let mut effects = vec![EffectSpec::new(EffectKind::Delay)];
        assert_eq!(graph.sync_effects(1, &effects, &mut rt), EffectSync::Rebuilt);
        assert_eq!(graph.sync_effects(1, &effects, &mut rt), EffectSync::Unchanged);

        rt.take_commands();
        effects[0].parameters.insert("feedback".into(), 0.5);
        assert_eq!(graph.sync_effects(1, &effects, &mut rt), EffectSync::Tweaked);
        let stage = graph.track(1).unwrap().effects[0].stage;
        assert_eq!(
            rt.commands(),
            &[StageCommand::SetParam { id: stage, param: "feedback".into(), value: 0.5 }]
        );
    }

    #[test]
    fn toggling_enabled_rebuilds() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        graph.ensure_track_graph(1, &mut rt);
        let effects = vec![EffectSpec::new(EffectKind::Filter)];
        graph.sync_effects(1, &effects, &mut rt);
        let disabled = vec![EffectSpec::new(EffectKind::Filter).disabled()];
        assert_eq!(graph.sync_effects(1, &disabled, &mut rt), EffectSync::Rebuilt);
        assert!(graph.track(1).unwrap().effects.is_empty());
    }

    #[test]
    fn volume_and_pan_are_clamped() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        let t = graph.ensure_track_graph(1, &mut rt).clone();
        rt.take_commands();
        graph.set_volume(1, 1.5, &mut rt);
        graph.set_pan(1, -2.0, &mut rt);
        assert_eq!(
            rt.commands(),
            &[
                StageCommand::SetValue { id: t.gain, value: 1.0 },
                StageCommand::SetValue { id: t.pan, value: -1.0 },
            ]
        );
    }

    #[test]
    fn stale_track_operations_are_noops() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        assert!(!graph.set_volume(9, 0.5, &mut rt));
        assert!(!graph.rebuild_effects_chain(9, &[], &mut rt));
        assert_eq!(graph.sync_effects(9, &[], &mut rt), EffectSync::Stale);
        assert!(!graph.remove_track(9, &mut rt));
        assert!(rt.commands().is_empty());
    }

    #[test]
    fn remove_track_recycles_ids() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        let first = graph.ensure_track_graph(1, &mut rt).clone();
        graph.remove_track(1, &mut rt);
        let second = graph.ensure_track_graph(2, &mut rt).clone();
        let mut a: Vec<_> = first.stages().collect();
        let mut b: Vec<_> = second.stages().collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn dispose_releases_everything() {
        let mut rt = OfflineRuntime::new(1000);
        let mut graph = SignalGraph::new();
        graph.ensure_track_graph(1, &mut rt);
        graph.ensure_track_graph(2, &mut rt);
        graph.dispose(&mut rt);
        let released = rt
            .commands()
            .iter()
            .filter(|c| matches!(c, StageCommand::Release { .. }))
            .count();
        assert_eq!(released, 9);
        assert!(graph.is_empty());
    }
}
