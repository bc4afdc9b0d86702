//! Automation engine: turns sparse lane points into control ramps on the
//! track gain and pan stages, window by window.

use cd_ir::{AutomationLane, AutomationParam, Project, TrackId};

use crate::graph::SignalGraph;
use crate::runtime::{AudioRuntime, StageCommand, StageId};
use crate::scheduler::Window;

#[derive(Debug, Default)]
pub struct AutomationEngine {
    /// Ramps issued since creation
    ramps: u64,
}

impl AutomationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ramps(&self) -> u64 {
        self.ramps
    }

    /// Schedule every enabled lane of every track for `window`. Returns the
    /// number of commands issued.
    ///
    /// On a fresh window each lane is first anchored at the window start
    /// with its interpolated value, so ramps run from the right level after
    /// a seek or loop wrap. Points are then issued as ramps in time order.
    pub fn schedule<R: AudioRuntime>(
        &mut self,
        window: &Window,
        project: &Project,
        graph: &mut SignalGraph,
        runtime: &mut R,
    ) -> usize {
        let mut issued = 0;
        for track in &project.tracks {
            for lane in track.automation.iter().filter(|l| l.enabled && !l.points.is_empty()) {
                let stage = lane_stage(graph, track.id, lane, runtime);
                issued += self.schedule_lane(window, lane, stage, runtime);
            }
        }
        issued
    }

    fn schedule_lane<R: AudioRuntime>(
        &mut self,
        window: &Window,
        lane: &AutomationLane,
        stage: StageId,
        runtime: &mut R,
    ) -> usize {
        let mut issued = 0;
        if window.fresh {
            if let Some(value) = lane.value_at(window.start_beat) {
                runtime.submit(StageCommand::SetValueAt {
                    id: stage,
                    value,
                    time: window.time_of(window.start_beat),
                });
                issued += 1;
            }
        }
        for point in lane.sorted_points().iter().filter(|p| window.contains(p.time)) {
            runtime.submit(StageCommand::RampTo {
                id: stage,
                value: lane.parameter.clamp(point.value),
                end_time: window.time_of(point.time),
            });
            self.ramps += 1;
            issued += 1;
        }
        issued
    }
}

fn lane_stage<R: AudioRuntime>(
    graph: &mut SignalGraph,
    track: TrackId,
    lane: &AutomationLane,
    runtime: &mut R,
) -> StageId {
    let handles = graph.ensure_track_graph(track, runtime);
    match lane.parameter {
        AutomationParam::Volume => handles.gain,
        AutomationParam::Pan => handles.pan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::OfflineRuntime;
    use cd_ir::Track;

    fn window(start: f64, end: f64, fresh: bool) -> Window {
        Window {
            origin: 2.0,
            start_beat: start,
            end_beat: end,
            seconds_per_beat: 0.5,
            fresh,
        }
    }

    fn project(lane: AutomationLane) -> Project {
        let mut track = Track::new(1, "keys");
        track.automation.push(lane);
        let mut p = Project::new(120.0);
        p.add_track(track);
        p
    }

    fn automation_commands(rt: &OfflineRuntime) -> Vec<StageCommand> {
        rt.commands()
            .iter()
            .filter(|c| matches!(c, StageCommand::SetValueAt { .. } | StageCommand::RampTo { .. }))
            .cloned()
            .collect()
    }

    #[test]
    fn points_in_window_become_ramps() {
        let lane = AutomationLane::new(AutomationParam::Volume)
            .with_point(0.0, 0.0)
            .with_point(1.0, 1.0)
            .with_point(4.0, 0.5);
        let p = project(lane);
        let mut graph = SignalGraph::new();
        let mut rt = OfflineRuntime::new(1000);
        let mut engine = AutomationEngine::new();

        assert_eq!(engine.schedule(&window(0.5, 2.0, false), &p, &mut graph, &mut rt), 1);
        let gain = graph.track(1).unwrap().gain;
        assert_eq!(
            automation_commands(&rt),
            vec![StageCommand::RampTo { id: gain, value: 1.0, end_time: 2.5 }]
        );
    }

    #[test]
    fn fresh_window_anchors_interpolated_value() {
        let lane = AutomationLane::new(AutomationParam::Volume)
            .with_point(0.0, 0.0)
            .with_point(4.0, 1.0);
        let p = project(lane);
        let mut graph = SignalGraph::new();
        let mut rt = OfflineRuntime::new(1000);
        let mut engine = AutomationEngine::new();

        engine.schedule(&window(2.0, 3.0, true), &p, &mut graph, &mut rt);
        let gain = graph.track(1).unwrap().gain;
        assert_eq!(
            automation_commands(&rt),
            vec![StageCommand::SetValueAt { id: gain, value: 0.5, time: 3.0 }]
        );
    }

    #[test]
    fn unsorted_points_are_issued_in_time_order_and_clamped() {
        let lane = AutomationLane::new(AutomationParam::Pan)
            .with_point(1.5, 3.0)
            .with_point(0.5, -0.25);
        let p = project(lane);
        let mut graph = SignalGraph::new();
        let mut rt = OfflineRuntime::new(1000);
        let mut engine = AutomationEngine::new();

        engine.schedule(&window(0.0, 2.0, false), &p, &mut graph, &mut rt);
        let pan = graph.track(1).unwrap().pan;
        assert_eq!(
            automation_commands(&rt),
            vec![
                StageCommand::RampTo { id: pan, value: -0.25, end_time: 2.25 },
                StageCommand::RampTo { id: pan, value: 1.0, end_time: 2.75 },
            ]
        );
        assert_eq!(engine.ramps(), 2);
    }

    #[test]
    fn empty_or_disabled_lanes_are_noops() {
        let mut graph = SignalGraph::new();
        let mut rt = OfflineRuntime::new(1000);
        let mut engine = AutomationEngine::new();

        let empty = project(AutomationLane::new(AutomationParam::Volume));
        assert_eq!(engine.schedule(&window(0.0, 4.0, true), &empty, &mut graph, &mut rt), 0);

        let mut lane = AutomationLane::new(AutomationParam::Volume).with_point(1.0, 0.5);
        lane.enabled = false;
        let disabled = project(lane);
        assert_eq!(engine.schedule(&window(0.0, 4.0, true), &disabled, &mut graph, &mut rt), 0);
        assert!(automation_commands(&rt).is_empty());
    }
}
