//! Project structure: tracks, clips, notes and mixer settings.

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

use crate::automation::AutomationLane;
use crate::effects::EffectSpec;
use crate::text::{label, truncated};
use crate::timing;

/// Stable track identifier, unique within a project session.
pub type TrackId = u32;

/// A complete project as edited by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Tempo in beats per minute
    #[serde(rename = "tempoBPM")]
    pub tempo_bpm: f64,
    /// Key signature label (display only, e.g. "C minor")
    #[serde(default)]
    pub key_signature: String,
    /// Tracks in display order
    #[serde(default)]
    pub tracks: Vec<Track>,
    /// Master output volume (0.0-1.0)
    #[serde(default = "unity")]
    pub master_volume: f32,
}

fn unity() -> f32 {
    1.0
}

impl Default for Project {
    fn default() -> Self {
        Self {
            tempo_bpm: 120.0,
            key_signature: String::new(),
            tracks: Vec::new(),
            master_volume: 1.0,
        }
    }
}

impl Project {
    /// Create an empty project at the given tempo.
    pub fn new(tempo_bpm: f64) -> Self {
        Self {
            tempo_bpm,
            ..Self::default()
        }
    }

    /// Length of the loop grid in seconds at the current tempo.
    pub fn total_duration(&self) -> f64 {
        timing::total_duration(self.tempo_bpm)
    }

    pub fn seconds_per_beat(&self) -> f64 {
        timing::seconds_per_beat(self.tempo_bpm)
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    /// Append a track. Returns false (and leaves the project untouched) if
    /// a track with the same id already exists.
    pub fn add_track(&mut self, track: Track) -> bool {
        if self.track(track.id).is_some() {
            return false;
        }
        self.tracks.push(track);
        true
    }

    /// Remove a track by id, returning it if it existed.
    pub fn remove_track(&mut self, id: TrackId) -> Option<Track> {
        let idx = self.tracks.iter().position(|t| t.id == id)?;
        Some(self.tracks.remove(idx))
    }

    /// True if any track is soloed.
    pub fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.mixer.is_solo)
    }

    /// Tracks that pass the mute/solo policy.
    pub fn audible_tracks(&self) -> impl Iterator<Item = &Track> {
        let any_solo = self.any_solo();
        self.tracks.iter().filter(move |t| t.is_audible(any_solo))
    }

    /// Set master volume, clamped to [0, 1].
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = clamp_volume(volume);
    }
}

/// How a track produces sound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackKind {
    /// Plays the notes of its clips through an instrument voice
    #[default]
    Note,
    /// Plays recorded audio; its clips carry no notes
    Audio,
}

/// A track in the arrangement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    #[serde(default)]
    pub kind: TrackKind,
    /// Instrument name; selects the voice waveform during playback
    #[serde(default, deserialize_with = "truncated")]
    pub instrument_name: ArrayString<32>,
    #[serde(default)]
    pub clips: Vec<Clip>,
    #[serde(default)]
    pub mixer: Mixer,
    #[serde(default)]
    pub automation: Vec<AutomationLane>,
    /// Armed for capture
    #[serde(default)]
    pub is_armed: bool,
    /// Display color (unused by the engine)
    #[serde(default, deserialize_with = "truncated")]
    pub color: ArrayString<16>,
}

impl Track {
    /// Create an empty note track.
    pub fn new(id: TrackId, instrument: &str) -> Self {
        Self {
            id,
            kind: TrackKind::Note,
            instrument_name: label(instrument),
            clips: Vec::new(),
            mixer: Mixer::default(),
            automation: Vec::new(),
            is_armed: false,
            color: ArrayString::new(),
        }
    }

    /// Builder-style: attach a clip.
    pub fn with_clip(mut self, clip: Clip) -> Self {
        self.clips.push(clip);
        self
    }

    /// Muted tracks are never audible; when any track is soloed only
    /// soloed tracks are.
    pub fn is_audible(&self, any_solo: bool) -> bool {
        !self.mixer.is_muted && (!any_solo || self.mixer.is_solo)
    }

    pub fn clip(&self, id: u32) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }
}

/// Per-track mixer strip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mixer {
    /// Linear gain (0.0-1.0)
    pub volume: f32,
    /// Stereo position (-1.0 left to 1.0 right)
    pub pan: f32,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_solo: bool,
    /// Effect chain in processing order
    #[serde(default)]
    pub effects: Vec<EffectSpec>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self {
            volume: 0.8,
            pan: 0.0,
            is_muted: false,
            is_solo: false,
            effects: Vec::new(),
        }
    }
}

impl Mixer {
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = clamp_pan(pan);
    }

    /// Clamp volume and pan into range in place.
    pub fn sanitize(&mut self) {
        self.volume = clamp_volume(self.volume);
        self.pan = clamp_pan(self.pan);
    }
}

/// Clamp a linear volume into [0, 1]. NaN maps to 0.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

/// Clamp a pan position into [-1, 1]. NaN maps to center.
pub fn clamp_pan(pan: f32) -> f32 {
    if pan.is_nan() {
        return 0.0;
    }
    pan.clamp(-1.0, 1.0)
}

/// A region on a track's timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: u32,
    /// Start position in beats from project origin
    pub start_time: f64,
    /// Length in beats
    pub duration: f64,
    /// Notes (note tracks only)
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Clip {
    pub fn new(id: u32, start_time: f64, duration: f64) -> Self {
        Self {
            id,
            start_time,
            duration,
            notes: Vec::new(),
        }
    }

    /// Builder-style: attach a note.
    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }

    /// Beat at which the clip ends.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration.max(0.0)
    }
}

/// A timed note inside a clip.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Semitone number (MIDI convention, 60 = middle C)
    pub pitch: u8,
    /// 0-127
    pub velocity: u8,
    /// Beats relative to clip start
    pub start_time: f64,
    /// Length in beats
    pub duration: f64,
}

impl Note {
    pub fn new(pitch: u8, velocity: u8, start_time: f64, duration: f64) -> Self {
        Self {
            pitch,
            velocity,
            start_time,
            duration,
        }
    }

    /// Absolute start beat. Never earlier than the clip start.
    pub fn absolute_start(&self, clip: &Clip) -> f64 {
        clip.start_time + self.start_time.max(0.0)
    }
}
