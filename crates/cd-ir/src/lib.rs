//! Core model types for the cadence sequencer.
//!
//! This crate defines the symbolic project the host edits: tracks, clips,
//! timed notes, mixer settings and automation lanes. The playback engine
//! reads it once per tick and never mutates it.

mod automation;
mod edit;
mod effects;
mod project;
mod text;
mod timing;

pub use automation::{AutomationLane, AutomationParam, AutomationPoint};
pub use edit::Edit;
pub use effects::{EffectKind, EffectParamInfo, EffectSpec};
pub use project::{clamp_pan, clamp_volume, Clip, Mixer, Note, Project, Track, TrackId, TrackKind};
pub use timing::{
    beats_to_seconds, seconds_per_beat, seconds_to_beats, total_duration, BARS, BEATS_PER_BAR,
    TOTAL_BEATS,
};
