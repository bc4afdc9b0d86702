//! Playback engine for the cadence sequencer.
//!
//! Translates the symbolic project into timed [`StageCommand`]s against an
//! [`AudioRuntime`] using a look-ahead scheduler, and ships a reference
//! render runtime that turns those commands into audio.

pub mod automation;
pub mod capture;
pub mod config;
pub mod engine;
mod frame;
pub mod frequency;
pub mod graph;
pub mod meter;
pub mod offline;
pub mod render;
pub mod runtime;
pub mod scheduler;
pub mod transport;
pub mod wav;

pub use automation::AutomationEngine;
pub use capture::{
    BufferedSource, CaptureAsset, CaptureError, CaptureFeed, CaptureSession, CaptureSource,
    CaptureTake,
};
pub use config::EngineConfig;
pub use engine::{Engine, TickReport};
pub use frame::Frame;
pub use graph::{EffectSync, MasterGraph, SignalGraph, TrackGraph};
pub use meter::{rms, Levels, Meters};
pub use offline::OfflineRuntime;
pub use render::{MeterTap, PreparedStage, RenderGraph, Retired};
pub use runtime::{AudioRuntime, DeviceError, StageCommand, StageId, StageKind, VoiceTrigger, Waveform};
pub use scheduler::{Scheduler, TickOutcome, Window};
pub use transport::{PlayState, Transport, TransportStep};
