//! Reference render runtime: turns [`StageCommand`]s into audio.
//!
//! Stages live in a flat table indexed by [`StageId`]. Each frame, voices
//! are summed into their destination stage, then stages run in
//! topological order and push their output along every connection. The
//! per-frame path does not allocate.
//!
//! A device callback can also apply commands without touching the heap:
//! stages are built elsewhere as [`PreparedStage`]s, stage storage is
//! reserved with [`RenderGraph::reserve_stages`], and whatever a command
//! frees comes back as [`Retired`] to be dropped on another thread.

mod control;
pub mod machines;
mod tap;
mod voice;

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::frame::Frame;
use crate::runtime::{StageCommand, StageId, StageKind};

pub use control::ControlTimeline;
pub use machines::{create_machine, Machine};
pub use tap::MeterTap;
pub use voice::{Voice, VoiceKey, VoicePool};

/// Reap finished voices every this many frames.
const REAP_INTERVAL: u64 = 256;

/// Connections reserved per stage.
const OUTPUT_CAPACITY: usize = 4;

enum Processor {
    Gain,
    Pan,
    Effect(Box<dyn Machine>),
    Meter(Arc<MeterTap>),
    Output,
}

struct Stage {
    processor: Processor,
    control: ControlTimeline,
    outputs: Vec<StageId>,
    /// Sum of everything fed into the stage this frame
    input: Frame,
}

impl Stage {
    fn process(&mut self, t: f64) -> Frame {
        let input = self.input;
        match &mut self.processor {
            Processor::Gain => input.scaled(self.control.value_at(t)),
            Processor::Pan => pan(input, self.control.value_at(t)),
            Processor::Effect(machine) => {
                let mut buf = [input.left, input.right];
                machine.work(&mut buf);
                Frame {
                    left: buf[0],
                    right: buf[1],
                }
            }
            Processor::Meter(tap) => {
                tap.push(input.to_mono());
                input
            }
            Processor::Output => input,
        }
    }
}

/// A stage built ahead of time, ready to be inserted without allocating.
pub struct PreparedStage(Stage);

impl PreparedStage {
    pub fn new(kind: StageKind, sample_rate: u32, meter_window: usize) -> Self {
        let (processor, initial) = match kind {
            StageKind::Gain => (Processor::Gain, 1.0),
            StageKind::Pan => (Processor::Pan, 0.0),
            StageKind::Effect { kind, params } => (
                Processor::Effect(create_machine(kind, &params, sample_rate)),
                0.0,
            ),
            StageKind::Meter => (Processor::Meter(Arc::new(MeterTap::new(meter_window))), 0.0),
            StageKind::Output => (Processor::Output, 0.0),
        };
        Self::with_processor(processor, initial)
    }

    /// A meter stage that records into an existing tap, so another thread
    /// can hold the tap before the stage exists.
    pub fn meter(tap: Arc<MeterTap>) -> Self {
        Self::with_processor(Processor::Meter(tap), 0.0)
    }

    fn with_processor(processor: Processor, initial: f32) -> Self {
        Self(Stage {
            processor,
            control: ControlTimeline::new(initial),
            outputs: Vec::with_capacity(OUTPUT_CAPACITY),
            input: Frame::silence(),
        })
    }
}

/// Heap data a command released from the graph.
#[derive(Default)]
pub struct Retired {
    stage: Option<Stage>,
    command: Option<StageCommand>,
}

impl Retired {
    fn stage(stage: Option<Stage>) -> Self {
        Self {
            stage,
            command: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stage.is_none() && self.command.is_none()
    }
}

/// Stereo panner: at the centre both channels pass unchanged, at the
/// extremes both channels fold into one side with equal power.
fn pan(input: Frame, pan: f32) -> Frame {
    let pan = pan.clamp(-1.0, 1.0);
    if pan <= 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        Frame {
            left: input.left + input.right * x.cos(),
            right: input.right * x.sin(),
        }
    } else {
        let x = pan * FRAC_PI_2;
        Frame {
            left: input.left * x.cos(),
            right: input.right + input.left * x.sin(),
        }
    }
}

/// The render-side stage graph.
pub struct RenderGraph {
    sample_rate: u32,
    stages: Vec<Option<Stage>>,
    /// Topological traversal order (sources first, output last)
    order: Vec<StageId>,
    in_degree: Vec<u32>,
    queue: Vec<StageId>,
    voices: VoicePool,
    release_time: f64,
    meter_window: usize,
    /// Frames rendered so far; the device clock
    frame: u64,
}

impl RenderGraph {
    pub fn new(sample_rate: u32, config: &EngineConfig) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            stages: Vec::new(),
            order: Vec::new(),
            in_degree: Vec::new(),
            queue: Vec::new(),
            voices: VoicePool::new(config.max_voices),
            release_time: config.release_time,
            meter_window: config.meter_window,
            frame: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device clock: seconds of audio rendered.
    pub fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    pub fn meter_window(&self) -> usize {
        self.meter_window
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    pub fn active_voices(&self) -> usize {
        self.voices.active_count()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.iter().flatten().count()
    }

    pub fn has_stage(&self, id: StageId) -> bool {
        self.stage(id).is_some()
    }

    /// Stages in processing order.
    pub fn order(&self) -> &[StageId] {
        &self.order
    }

    fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id as usize).and_then(Option::as_ref)
    }

    fn stage_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.stages.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Shared handle to a meter stage's waveform.
    pub fn meter_tap(&self, id: StageId) -> Option<Arc<MeterTap>> {
        match &self.stage(id)?.processor {
            Processor::Meter(tap) => Some(Arc::clone(tap)),
            _ => None,
        }
    }

    pub fn read_meter(&self, id: StageId, out: &mut [f32]) -> usize {
        match self.stage(id).map(|s| &s.processor) {
            Some(Processor::Meter(tap)) => tap.read(out),
            _ => 0,
        }
    }

    /// Reserve room for stage ids below `capacity`, so inserting stages
    /// and rewiring them does not allocate.
    pub fn reserve_stages(&mut self, capacity: usize) {
        if self.stages.len() < capacity {
            self.stages.resize_with(capacity, || None);
        }
        self.order.reserve(capacity);
        self.in_degree.reserve(capacity);
        self.queue.reserve(capacity);
    }

    /// Apply one command. Commands naming unknown stages are ignored.
    /// `Create` builds its stage here; use [`insert`](Self::insert) with a
    /// [`PreparedStage`] to keep construction off this thread.
    pub fn apply(&mut self, command: StageCommand) -> Retired {
        let now = self.now();
        match command {
            StageCommand::Create { id, kind } => {
                let stage = PreparedStage::new(kind, self.sample_rate, self.meter_window);
                return self.insert(id, stage);
            }
            StageCommand::Connect { from, to } => {
                if !self.has_stage(to) {
                    return Retired::default();
                }
                if let Some(stage) = self.stage_mut(from) {
                    if !stage.outputs.contains(&to) {
                        stage.outputs.push(to);
                    }
                    self.refresh_order();
                }
            }
            StageCommand::Disconnect { from } => {
                if let Some(stage) = self.stage_mut(from) {
                    stage.outputs.clear();
                    self.refresh_order();
                }
            }
            StageCommand::Release { id } => {
                let old = self.stages.get_mut(id as usize).and_then(Option::take);
                for stage in self.stages.iter_mut().flatten() {
                    stage.outputs.retain(|&to| to != id);
                }
                self.voices.kill_dest(id);
                self.refresh_order();
                return Retired::stage(old);
            }
            StageCommand::SetValue { id, value } => {
                if let Some(stage) = self.stage_mut(id) {
                    stage.control.set(value, now);
                }
            }
            StageCommand::SetValueAt { id, value, time } => {
                if let Some(stage) = self.stage_mut(id) {
                    stage.control.set_at(value, time);
                }
            }
            StageCommand::RampTo { id, value, end_time } => {
                if let Some(stage) = self.stage_mut(id) {
                    stage.control.ramp_to(value, end_time);
                }
            }
            StageCommand::SetParam { id, param, value } => {
                if let Some(Processor::Effect(machine)) =
                    self.stage_mut(id).map(|s| &mut s.processor)
                {
                    machine.set_param(&param, value);
                }
                return Retired {
                    stage: None,
                    command: Some(StageCommand::SetParam { id, param, value }),
                };
            }
            StageCommand::Trigger { dest, voice } => {
                if self.has_stage(dest) {
                    self.voices.allocate(Voice::new(dest, voice));
                }
            }
        }
        Retired::default()
    }

    /// Put a prepared stage at `id`. Returns whatever held the slot.
    pub fn insert(&mut self, id: StageId, stage: PreparedStage) -> Retired {
        let idx = id as usize;
        if idx >= self.stages.len() {
            self.stages.resize_with(idx + 1, || None);
        }
        let old = self.stages[idx].replace(stage.0);
        self.refresh_order();
        Retired::stage(old)
    }

    /// Recompute the traversal order with Kahn's algorithm. Stages caught
    /// in a cycle are left out.
    fn refresh_order(&mut self) {
        let n = self.stages.len();
        self.in_degree.clear();
        self.in_degree.resize(n, 0);
        for stage in self.stages.iter().flatten() {
            for &to in &stage.outputs {
                self.in_degree[to as usize] += 1;
            }
        }

        self.queue.clear();
        self.queue.extend(
            (0..n)
                .filter(|&i| self.stages[i].is_some() && self.in_degree[i] == 0)
                .map(|i| i as StageId),
        );

        self.order.clear();
        while let Some(id) = self.queue.pop() {
            self.order.push(id);
            if let Some(stage) = self.stages[id as usize].as_ref() {
                for &to in &stage.outputs {
                    self.in_degree[to as usize] -= 1;
                    if self.in_degree[to as usize] == 0 {
                        self.queue.push(to);
                    }
                }
            }
        }
    }

    /// Render one frame and advance the clock.
    pub fn render_frame(&mut self) -> Frame {
        let t = self.now();
        for stage in self.stages.iter_mut().flatten() {
            stage.input = Frame::silence();
        }

        let stages = &mut self.stages;
        self.voices
            .render_all(t, self.sample_rate, self.release_time, |dest, sample| {
                if let Some(Some(stage)) = stages.get_mut(dest as usize) {
                    stage.input.mix(sample);
                }
            });

        let mut out = Frame::silence();
        for i in 0..self.order.len() {
            let id = self.order[i] as usize;
            let Some(stage) = self.stages[id].as_mut() else {
                continue;
            };
            let processed = stage.process(t);
            if matches!(stage.processor, Processor::Output) {
                out.mix(processed);
            }
            let mut j = 0;
            while let Some(to) = self.stages[id].as_ref().and_then(|s| s.outputs.get(j).copied()) {
                if let Some(Some(dest)) = self.stages.get_mut(to as usize) {
                    dest.input.mix(processed);
                }
                j += 1;
            }
        }

        self.frame += 1;
        if self.frame % REAP_INTERVAL == 0 {
            self.voices.reap_finished();
        }
        out
    }

    /// Fill `out` with consecutive frames.
    pub fn render(&mut self, out: &mut [Frame]) {
        for frame in out.iter_mut() {
            *frame = self.render_frame();
        }
    }

    /// Interleaved stereo variant of [`render`](Self::render).
    pub fn render_interleaved(&mut self, out: &mut [f32]) {
        for pair in out.chunks_exact_mut(2) {
            let frame = self.render_frame();
            pair[0] = frame.left;
            pair[1] = frame.right;
        }
    }

    /// Stop every voice and clear effect tails.
    pub fn silence(&mut self) {
        self.voices.clear();
        for stage in self.stages.iter_mut().flatten() {
            if let Processor::Effect(machine) = &mut stage.processor {
                machine.stop();
            }
        }
    }
}
