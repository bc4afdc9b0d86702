//! The seam between the engine and the audio runtime that renders sound.
//!
//! The engine never touches samples. It issues [`StageCommand`]s, timed
//! against the runtime's own device clock, and reads meter waveforms back.

use std::collections::BTreeMap;

use cd_ir::EffectKind;
use thiserror::Error;

/// Identifier of a processing stage inside the runtime.
pub type StageId = u32;

/// Failure to acquire or drive an audio device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("no audio device available")]
    NoDevice,
    #[error("access to the audio device was denied: {0}")]
    PermissionDenied(String),
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
}

/// What a stage does.
#[derive(Clone, Debug, PartialEq)]
pub enum StageKind {
    /// Linear gain, control value 0..1
    Gain,
    /// Equal-power stereo pan, control value -1..1
    Pan,
    /// Effect processor with its resolved parameter set
    Effect {
        kind: EffectKind,
        params: BTreeMap<String, f32>,
    },
    /// Pass-through that records a waveform for metering
    Meter,
    /// The device output
    Output,
}

/// Oscillator shape for a triggered voice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Square,
    Saw,
}

/// One note, fully resolved to device time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceTrigger {
    /// Hz
    pub frequency: f32,
    /// Peak amplitude 0..1
    pub amplitude: f32,
    /// Device-clock seconds
    pub start: f64,
    /// Device-clock seconds
    pub stop: f64,
    pub waveform: Waveform,
}

/// A low-level instruction for the runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum StageCommand {
    Create { id: StageId, kind: StageKind },
    Connect { from: StageId, to: StageId },
    /// Drop every outgoing connection of `from`.
    Disconnect { from: StageId },
    Release { id: StageId },
    /// Jump the control value now.
    SetValue { id: StageId, value: f32 },
    /// Anchor the control value at a device time.
    SetValueAt { id: StageId, value: f32, time: f64 },
    /// Ramp linearly from the previous anchor to `value`, arriving at `end_time`.
    RampTo { id: StageId, value: f32, end_time: f64 },
    /// Change one effect parameter without rebuilding the stage.
    SetParam { id: StageId, param: String, value: f32 },
    /// Start a voice feeding into `dest`.
    Trigger { dest: StageId, voice: VoiceTrigger },
}

/// An audio runtime the engine drives.
pub trait AudioRuntime {
    /// Device clock in seconds. Monotonic, hardware-synchronized.
    fn now(&self) -> f64;

    fn sample_rate(&self) -> u32;

    /// Acquire (on first call) and resume the output device.
    fn resume(&mut self) -> Result<(), DeviceError>;

    /// Suspend the output device.
    fn suspend(&mut self);

    /// Hand one instruction to the runtime.
    fn submit(&mut self, command: StageCommand);

    /// Copy the most recent waveform samples of a meter stage into `out`,
    /// returning how many were written.
    fn read_meter(&self, stage: StageId, out: &mut [f32]) -> usize;
}
