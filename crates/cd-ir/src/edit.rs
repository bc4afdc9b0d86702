//! Edit commands for mutating a project during playback.
//!
//! Edits arrive from the local editor or are relayed from collaborators;
//! either way they are applied to the local model between ticks.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::automation::{AutomationLane, AutomationParam};
use crate::effects::EffectSpec;
use crate::project::{clamp_volume, Clip, Mixer, Project, Track, TrackId};

/// A change event that mutates a project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Edit {
    AddTrack { track: Track },
    RemoveTrack { track: TrackId },
    SetMixer { track: TrackId, mixer: Mixer },
    SetVolume { track: TrackId, volume: f32 },
    SetPan { track: TrackId, pan: f32 },
    SetMute { track: TrackId, muted: bool },
    SetSolo { track: TrackId, solo: bool },
    SetEffects { track: TrackId, effects: Vec<EffectSpec> },
    /// Insert a clip, or replace the clip with the same id.
    UpsertClip { track: TrackId, clip: Clip },
    RemoveClip { track: TrackId, clip: u32 },
    /// Replace the lane for `lane.parameter`, or add it.
    SetAutomation { track: TrackId, lane: AutomationLane },
    RemoveAutomation { track: TrackId, parameter: AutomationParam },
    SetTempo { bpm: f64 },
    SetMasterVolume { volume: f32 },
}

impl Edit {
    /// Track this edit targets, if any.
    pub fn track(&self) -> Option<TrackId> {
        match self {
            Edit::AddTrack { track } => Some(track.id),
            Edit::RemoveTrack { track }
            | Edit::SetMixer { track, .. }
            | Edit::SetVolume { track, .. }
            | Edit::SetPan { track, .. }
            | Edit::SetMute { track, .. }
            | Edit::SetSolo { track, .. }
            | Edit::SetEffects { track, .. }
            | Edit::UpsertClip { track, .. }
            | Edit::RemoveClip { track, .. }
            | Edit::SetAutomation { track, .. }
            | Edit::RemoveAutomation { track, .. } => Some(*track),
            Edit::SetTempo { .. } | Edit::SetMasterVolume { .. } => None,
        }
    }
}

impl Project {
    /// Apply an edit. Returns true if the project changed.
    ///
    /// Edits naming a track that does not exist are ignored with a warning;
    /// out-of-range mixer values are clamped.
    pub fn apply(&mut self, edit: &Edit) -> bool {
        match edit {
            Edit::AddTrack { track } => {
                let mut track = track.clone();
                track.mixer.sanitize();
                let added = self.add_track(track);
                if !added {
                    warn!(track = edit.track(), "duplicate track id, edit ignored");
                }
                added
            }
            Edit::RemoveTrack { track } => {
                let removed = self.remove_track(*track).is_some();
                if !removed {
                    warn!(track, "remove of unknown track ignored");
                }
                removed
            }
            Edit::SetTempo { bpm } => {
                if !bpm.is_finite() || *bpm <= 0.0 {
                    warn!(bpm, "invalid tempo ignored");
                    return false;
                }
                self.tempo_bpm = *bpm;
                true
            }
            Edit::SetMasterVolume { volume } => {
                self.master_volume = clamp_volume(*volume);
                true
            }
            _ => {
                let Some(id) = edit.track() else {
                    return false;
                };
                let Some(track) = self.track_mut(id) else {
                    warn!(track = id, "edit for unknown track ignored");
                    return false;
                };
                apply_track_edit(track, edit)
            }
        }
    }
}

fn apply_track_edit(track: &mut Track, edit: &Edit) -> bool {
    match edit {
        Edit::SetMixer { mixer, .. } => {
            track.mixer = mixer.clone();
            track.mixer.sanitize();
        }
        Edit::SetVolume { volume, .. } => track.mixer.set_volume(*volume),
        Edit::SetPan { pan, .. } => track.mixer.set_pan(*pan),
        Edit::SetMute { muted, .. } => track.mixer.is_muted = *muted,
        Edit::SetSolo { solo, .. } => track.mixer.is_solo = *solo,
        Edit::SetEffects { effects, .. } => track.mixer.effects = effects.clone(),
        Edit::UpsertClip { clip, .. } => match track.clips.iter_mut().find(|c| c.id == clip.id) {
            Some(existing) => *existing = clip.clone(),
            None => track.clips.push(clip.clone()),
        },
        Edit::RemoveClip { clip, .. } => {
            let before = track.clips.len();
            track.clips.retain(|c| c.id != *clip);
            if track.clips.len() == before {
                warn!(track = track.id, clip, "remove of unknown clip ignored");
                return false;
            }
        }
        Edit::SetAutomation { lane, .. } => {
            match track
                .automation
                .iter_mut()
                .find(|l| l.parameter == lane.parameter)
            {
                Some(existing) => *existing = lane.clone(),
                None => track.automation.push(lane.clone()),
            }
        }
        Edit::RemoveAutomation { parameter, .. } => {
            let before = track.automation.len();
            track.automation.retain(|l| l.parameter != *parameter);
            return track.automation.len() != before;
        }
        Edit::AddTrack { .. }
        | Edit::RemoveTrack { .. }
        | Edit::SetTempo { .. }
        | Edit::SetMasterVolume { .. } => return false,
    }
    true
}
