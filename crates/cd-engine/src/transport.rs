//! Transport clock: play/pause/stop/seek/loop state and the mapping from
//! project time to device time.
//!
//! While playing, `origin` is the device-clock time of beat 0 of the
//! current loop cycle, so `now - origin` is the transport position in
//! seconds. Every trigger time the scheduler computes goes through this
//! anchor.

use cd_ir::{seconds_per_beat, total_duration};
use tracing::info;

use crate::runtime::{AudioRuntime, DeviceError};

/// Playback state machine: `Stopped → Playing ⇄ Paused → Stopped`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Result of advancing the transport to the device clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportStep {
    /// Not playing; nothing advanced.
    Idle,
    /// Position updated within the current cycle.
    Running,
    /// Reached the end while looping; origin moved forward one cycle.
    Wrapped,
    /// Reached the end without looping; transport is now stopped.
    Ended,
}

/// The transport clock.
#[derive(Clone, Debug)]
pub struct Transport {
    state: PlayState,
    /// Observable position in seconds
    position: f64,
    /// Device time of beat 0 (valid while playing)
    origin: f64,
    tempo_bpm: f64,
    looping: bool,
}

impl Transport {
    pub fn new(tempo_bpm: f64) -> Self {
        Self {
            state: PlayState::Stopped,
            position: 0.0,
            origin: 0.0,
            tempo_bpm: sanitize_tempo(tempo_bpm, 120.0),
            looping: false,
        }
    }

    // --- Commands ---

    /// Start or resume playback.
    ///
    /// Resumes (acquiring on first use) the output device, then anchors the
    /// origin so that `now - origin` equals the current position. If the
    /// device cannot be resumed the transport is left exactly as it was.
    pub fn play<R: AudioRuntime>(&mut self, runtime: &mut R) -> Result<(), DeviceError> {
        if self.state == PlayState::Playing {
            return Ok(());
        }
        runtime.resume()?;
        if self.position >= self.total_duration() {
            self.position = 0.0;
        }
        self.origin = runtime.now() - self.position;
        self.state = PlayState::Playing;
        info!(position = self.position, tempo = self.tempo_bpm, "transport playing");
        Ok(())
    }

    /// Pause, keeping the position at the device time `now`.
    pub fn pause(&mut self, now: f64) {
        if self.state != PlayState::Playing {
            return;
        }
        self.position = self.live_position(now);
        self.state = PlayState::Paused;
        info!(position = self.position, "transport paused");
    }

    /// Stop and rewind to zero.
    pub fn stop(&mut self) {
        if self.state != PlayState::Stopped {
            info!("transport stopped");
        }
        self.state = PlayState::Stopped;
        self.position = 0.0;
    }

    /// Move to `target` seconds, clamped to the loop grid. While playing the
    /// origin is re-anchored so scheduling continues from the new position.
    /// Returns the clamped position.
    pub fn seek(&mut self, target: f64, now: f64) -> f64 {
        let target = if target.is_nan() { 0.0 } else { target };
        self.position = target.clamp(0.0, self.total_duration());
        if self.state == PlayState::Playing {
            self.origin = now - self.position;
        }
        self.position
    }

    /// Seek relative to the current position.
    pub fn seek_with(&mut self, update: impl FnOnce(f64) -> f64, now: f64) -> f64 {
        let current = self.live_position(now);
        self.seek(update(current), now)
    }

    /// Change tempo. The beat position is preserved: position (seconds) is
    /// rescaled and, while playing, the origin is re-anchored.
    pub fn set_tempo(&mut self, bpm: f64, now: f64) {
        let bpm = sanitize_tempo(bpm, self.tempo_bpm);
        if bpm == self.tempo_bpm {
            return;
        }
        let beat = self.live_position(now) / self.seconds_per_beat();
        self.tempo_bpm = bpm;
        self.position = (beat * self.seconds_per_beat()).clamp(0.0, self.total_duration());
        if self.state == PlayState::Playing {
            self.origin = now - self.position;
        }
        info!(tempo = bpm, position = self.position, "tempo changed");
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    // --- Clock ---

    /// Bring the observable position up to the device time `now`.
    pub fn advance(&mut self, now: f64) -> TransportStep {
        if self.state != PlayState::Playing {
            return TransportStep::Idle;
        }
        let total = self.total_duration();
        let elapsed = now - self.origin;
        if elapsed < total {
            self.position = elapsed.max(0.0);
            return TransportStep::Running;
        }
        if !self.looping {
            self.stop();
            return TransportStep::Ended;
        }
        let cycles = (elapsed / total).floor();
        self.origin += cycles * total;
        self.position = (now - self.origin).clamp(0.0, total);
        TransportStep::Wrapped
    }

    /// Position at device time `now` without mutating state.
    fn live_position(&self, now: f64) -> f64 {
        match self.state {
            PlayState::Playing => (now - self.origin).clamp(0.0, self.total_duration()),
            PlayState::Paused | PlayState::Stopped => self.position,
        }
    }

    // --- Accessors ---

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    /// Transport position in seconds, as of the last tick or command.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn position_beats(&self) -> f64 {
        self.position / self.seconds_per_beat()
    }

    /// Device time of beat 0 of the current cycle.
    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn tempo(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn seconds_per_beat(&self) -> f64 {
        seconds_per_beat(self.tempo_bpm)
    }

    pub fn total_duration(&self) -> f64 {
        total_duration(self.tempo_bpm)
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(120.0)
    }
}

fn sanitize_tempo(bpm: f64, fallback: f64) -> f64 {
    if bpm.is_finite() && bpm > 0.0 {
        bpm
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::OfflineRuntime;

    fn runtime_at(seconds: f64) -> OfflineRuntime {
        let mut rt = OfflineRuntime::new(1000);
        rt.advance(seconds);
        rt
    }

    #[test]
    fn play_anchors_origin_to_position() {
        let mut rt = runtime_at(5.0);
        let mut t = Transport::new(120.0);
        t.seek(2.0, rt.now());
        t.play(&mut rt).unwrap();
        assert!(t.is_playing());
        assert!((t.origin() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn failed_play_leaves_state_unchanged() {
        let mut rt = OfflineRuntime::disconnected(1000);
        let mut t = Transport::new(120.0);
        t.seek(4.0, 0.0);
        assert_eq!(t.play(&mut rt), Err(DeviceError::NoDevice));
        assert_eq!(t.state(), PlayState::Stopped);
        assert_eq!(t.position(), 4.0);
    }

    #[test]
    fn pause_keeps_position_stop_rewinds() {
        let mut rt = runtime_at(0.0);
        let mut t = Transport::new(120.0);
        t.play(&mut rt).unwrap();
        rt.advance(1.5);
        t.pause(rt.now());
        assert_eq!(t.state(), PlayState::Paused);
        assert!((t.position() - 1.5).abs() < 1e-9);
        t.stop();
        assert_eq!(t.position(), 0.0);
        assert_eq!(t.state(), PlayState::Stopped);
    }

    #[test]
    fn seek_clamps_to_grid() {
        let mut t = Transport::new(120.0);
        assert_eq!(t.seek(-3.0, 0.0), 0.0);
        assert_eq!(t.seek(1000.0, 0.0), 64.0);
        assert_eq!(t.seek_with(|p| p - 10.0, 0.0), 54.0);
    }

    #[test]
    fn seek_while_playing_reanchors() {
        let mut rt = runtime_at(10.0);
        let mut t = Transport::new(120.0);
        t.play(&mut rt).unwrap();
        t.seek(30.0, rt.now());
        assert!((t.origin() - -20.0).abs() < 1e-9);
    }

    #[test]
    fn seek_while_stopped_only_moves_resume_point() {
        let mut t = Transport::new(120.0);
        t.seek(12.0, 99.0);
        assert_eq!(t.state(), PlayState::Stopped);
        assert_eq!(t.position(), 12.0);
    }

    #[test]
    fn tempo_change_preserves_beat() {
        let mut rt = runtime_at(0.0);
        let mut t = Transport::new(120.0);
        t.play(&mut rt).unwrap();
        rt.advance(10.0);
        t.set_tempo(96.0, rt.now());
        // beat 20 at 96 BPM is 12.5 seconds in
        assert!((t.position() - 12.5).abs() < 1e-6);
        assert!((t.position_beats() - 20.0).abs() < 1e-6);
        assert_eq!(t.seconds_per_beat(), 0.625);
    }

    #[test]
    fn advance_stops_at_end_without_loop() {
        let mut rt = runtime_at(0.0);
        let mut t = Transport::new(120.0);
        t.play(&mut rt).unwrap();
        assert_eq!(t.advance(63.9), TransportStep::Running);
        assert_eq!(t.advance(64.0), TransportStep::Ended);
        assert_eq!(t.state(), PlayState::Stopped);
        assert_eq!(t.position(), 0.0);
    }

    #[test]
    fn advance_wraps_when_looping() {
        let mut rt = runtime_at(0.0);
        let mut t = Transport::new(120.0);
        t.set_looping(true);
        t.play(&mut rt).unwrap();
        assert_eq!(t.advance(64.02), TransportStep::Wrapped);
        assert!(t.is_playing());
        assert!((t.origin() - 64.0).abs() < 1e-9);
        assert!((t.position() - 0.02).abs() < 1e-9);
    }

    #[test]
    fn invalid_tempo_is_ignored() {
        let mut t = Transport::new(120.0);
        t.set_tempo(0.0, 0.0);
        t.set_tempo(f64::NAN, 0.0);
        assert_eq!(t.tempo(), 120.0);
    }
}
