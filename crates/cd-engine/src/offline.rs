//! In-process runtime that renders on demand.
//!
//! The device clock advances only when audio is rendered, which makes the
//! engine fully deterministic under test and lets the master crate bounce
//! a project to a file faster than real time.

use tracing::debug;

use crate::config::EngineConfig;
use crate::frame::Frame;
use crate::render::RenderGraph;
use crate::runtime::{AudioRuntime, DeviceError, StageCommand, StageId};

pub struct OfflineRuntime {
    graph: RenderGraph,
    /// Every command submitted, in order
    history: Vec<StageCommand>,
    running: bool,
    /// Simulates a machine with no usable output device
    connected: bool,
}

impl OfflineRuntime {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_config(sample_rate, &EngineConfig::default())
    }

    pub fn with_config(sample_rate: u32, config: &EngineConfig) -> Self {
        Self {
            graph: RenderGraph::new(sample_rate, config),
            history: Vec::new(),
            running: false,
            connected: true,
        }
    }

    /// A runtime whose `resume` always fails with [`DeviceError::NoDevice`].
    pub fn disconnected(sample_rate: u32) -> Self {
        Self {
            connected: false,
            ..Self::new(sample_rate)
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Render and discard `seconds` of audio.
    pub fn advance(&mut self, seconds: f64) {
        let frames = (seconds.max(0.0) * self.graph.sample_rate() as f64).round() as usize;
        for _ in 0..frames {
            self.graph.render_frame();
        }
    }

    pub fn render(&mut self, frames: usize) -> Vec<Frame> {
        let mut out = vec![Frame::silence(); frames];
        self.graph.render(&mut out);
        out
    }

    pub fn render_into(&mut self, out: &mut [Frame]) {
        self.graph.render(out);
    }

    pub fn commands(&self) -> &[StageCommand] {
        &self.history
    }

    pub fn take_commands(&mut self) -> Vec<StageCommand> {
        std::mem::take(&mut self.history)
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.graph
    }
}

impl AudioRuntime for OfflineRuntime {
    fn now(&self) -> f64 {
        self.graph.now()
    }

    fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::NoDevice);
        }
        if !self.running {
            debug!(sample_rate = self.graph.sample_rate(), "offline runtime resumed");
        }
        self.running = true;
        Ok(())
    }

    fn suspend(&mut self) {
        self.running = false;
    }

    fn submit(&mut self, command: StageCommand) {
        self.history.push(command.clone());
        self.graph.apply(command);
    }

    fn read_meter(&self, stage: StageId, out: &mut [f32]) -> usize {
        self.graph.read_meter(stage, out)
    }
}
