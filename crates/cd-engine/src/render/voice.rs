//! Oscillator voices and the pool that owns them.

use core::f32::consts::TAU;

use slotmap::{new_key_type, SlotMap};

use crate::frame::Frame;
use crate::runtime::{StageId, VoiceTrigger, Waveform};

new_key_type! {
    /// Handle to a live voice.
    pub struct VoiceKey;
}

/// A single voice producing audio from an oscillator.
#[derive(Clone, Debug)]
pub struct Voice {
    /// Stage the voice feeds
    pub dest: StageId,
    pub trigger: VoiceTrigger,
    /// Oscillator phase in cycles (0..1)
    phase: f32,
    finished: bool,
}

impl Voice {
    pub fn new(dest: StageId, trigger: VoiceTrigger) -> Self {
        Self {
            dest,
            trigger,
            phase: 0.0,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Render the voice at device time `t`. Voices whose start time has
    /// passed without being rendered start at their first rendered frame.
    pub fn render(&mut self, t: f64, sample_rate: u32, release: f64) -> f32 {
        if self.finished || t < self.trigger.start {
            return 0.0;
        }
        let env = envelope(t, &self.trigger, release);
        if env <= 0.0 && t >= self.trigger.stop {
            self.finished = true;
            return 0.0;
        }
        let value = oscillator(self.trigger.waveform, self.phase);
        self.phase = (self.phase + self.trigger.frequency / sample_rate.max(1) as f32).fract();
        value * self.trigger.amplitude * env
    }
}

/// Linear attack and release of `release` seconds around the gate.
fn envelope(t: f64, trigger: &VoiceTrigger, release: f64) -> f32 {
    if release <= 0.0 {
        return if t < trigger.stop { 1.0 } else { 0.0 };
    }
    let attack = ((t - trigger.start) / release).min(1.0);
    let tail = if t < trigger.stop {
        1.0
    } else {
        1.0 - (t - trigger.stop) / release
    };
    attack.min(tail).max(0.0) as f32
}

fn oscillator(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (phase * TAU).sin(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Saw => 2.0 * phase - 1.0,
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
    }
}

/// Fixed-capacity pool of voices. Full pools steal the voice whose gate
/// closes first.
pub struct VoicePool {
    voices: SlotMap<VoiceKey, Voice>,
    capacity: usize,
}

impl VoicePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            voices: SlotMap::with_capacity_and_key(capacity),
            capacity,
        }
    }

    pub fn allocate(&mut self, voice: Voice) -> VoiceKey {
        if self.voices.len() >= self.capacity {
            if let Some(victim) = self.steal_candidate() {
                self.voices.remove(victim);
            }
        }
        self.voices.insert(voice)
    }

    fn steal_candidate(&self) -> Option<VoiceKey> {
        self.voices
            .iter()
            .min_by(|(_, a), (_, b)| a.trigger.stop.total_cmp(&b.trigger.stop))
            .map(|(key, _)| key)
    }

    pub fn get(&self, key: VoiceKey) -> Option<&Voice> {
        self.voices.get(key)
    }

    /// Drop every voice feeding `dest`.
    pub fn kill_dest(&mut self, dest: StageId) {
        self.voices.retain(|_, v| v.dest != dest);
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Remove voices that have finished their release.
    pub fn reap_finished(&mut self) {
        self.voices.retain(|_, v| !v.finished);
    }

    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Render every voice at time `t`, handing `(dest, sample)` pairs to
    /// `sink`.
    pub fn render_all(
        &mut self,
        t: f64,
        sample_rate: u32,
        release: f64,
        mut sink: impl FnMut(StageId, Frame),
    ) {
        for voice in self.voices.values_mut() {
            let value = voice.render(t, sample_rate, release);
            if value != 0.0 {
                sink(voice.dest, Frame::mono(value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(start: f64, stop: f64) -> VoiceTrigger {
        VoiceTrigger {
            frequency: 100.0,
            amplitude: 1.0,
            start,
            stop,
            waveform: Waveform::Square,
        }
    }

    #[test]
    fn silent_before_start() {
        let mut v = Voice::new(0, trigger(1.0, 2.0));
        assert_eq!(v.render(0.5, 1000, 0.0), 0.0);
        assert!(!v.is_finished());
    }

    #[test]
    fn plays_between_start_and_stop() {
        let mut v = Voice::new(0, trigger(0.0, 1.0));
        assert_eq!(v.render(0.0, 1000, 0.0), 1.0);
    }

    #[test]
    fn finishes_after_release() {
        let mut v = Voice::new(0, trigger(0.0, 1.0));
        assert!(v.render(1.002, 1000, 0.005) > 0.0);
        assert_eq!(v.render(1.006, 1000, 0.005), 0.0);
        assert!(v.is_finished());
    }

    #[test]
    fn late_voice_starts_immediately() {
        let mut v = Voice::new(0, trigger(0.0, 10.0));
        assert_eq!(v.render(5.0, 1000, 0.005), 1.0);
    }

    #[test]
    fn pool_steals_earliest_stop() {
        let mut pool = VoicePool::new(2);
        let a = pool.allocate(Voice::new(0, trigger(0.0, 5.0)));
        let b = pool.allocate(Voice::new(0, trigger(0.0, 1.0)));
        let c = pool.allocate(Voice::new(0, trigger(0.0, 3.0)));
        assert_eq!(pool.active_count(), 2);
        assert!(pool.get(a).is_some());
        assert!(pool.get(b).is_none());
        assert!(pool.get(c).is_some());
    }

    #[test]
    fn reap_and_kill() {
        let mut pool = VoicePool::new(4);
        pool.allocate(Voice::new(1, trigger(0.0, 0.001)));
        pool.allocate(Voice::new(2, trigger(0.0, 10.0)));
        pool.render_all(1.0, 1000, 0.0, |_, _| {});
        pool.reap_finished();
        assert_eq!(pool.active_count(), 1);
        pool.kill_dest(2);
        assert_eq!(pool.active_count(), 0);
    }
}
