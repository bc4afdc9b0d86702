//! Feed-forward peak compressor with attack/release envelope.

use cd_ir::EffectKind;

use super::{db_to_gain, time_coefficient, Machine};

pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    attack_coef: f32,
    release_coef: f32,
    envelope: f32,
    sample_rate: u32,
}

impl Compressor {
    pub fn new() -> Self {
        Self {
            threshold_db: -24.0,
            ratio: 4.0,
            attack: 0.003,
            release: 0.25,
            attack_coef: 0.0,
            release_coef: 0.0,
            envelope: 0.0,
            sample_rate: 44100,
        }
    }

    fn recompute(&mut self) {
        self.attack_coef = time_coefficient(self.attack, self.sample_rate);
        self.release_coef = time_coefficient(self.release, self.sample_rate);
    }

    /// Linear gain to apply at envelope level `level`.
    fn gain_for(&self, level: f32) -> f32 {
        if level <= 1e-9 {
            return 1.0;
        }
        let level_db = 20.0 * level.log10();
        let over = level_db - self.threshold_db;
        if over <= 0.0 {
            return 1.0;
        }
        db_to_gain(over / self.ratio - over)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for Compressor {
    fn kind(&self) -> EffectKind {
        EffectKind::Compressor
    }

    fn init(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.recompute();
    }

    fn set_param(&mut self, name: &str, value: f32) {
        let value = EffectKind::Compressor.clamp_param(name, value);
        match name {
            "threshold" => self.threshold_db = value,
            "ratio" => self.ratio = value.max(1.0),
            "attack" => self.attack = value,
            "release" => self.release = value,
            _ => return,
        }
        self.recompute();
    }

    fn work(&mut self, buffer: &mut [f32]) {
        for pair in buffer.chunks_exact_mut(2) {
            let peak = pair[0].abs().max(pair[1].abs());
            let coef = if peak > self.envelope {
                self.attack_coef
            } else {
                self.release_coef
            };
            self.envelope = peak + coef * (self.envelope - peak);
            let gain = self.gain_for(self.envelope);
            pair[0] *= gain;
            pair[1] *= gain;
        }
    }

    fn stop(&mut self) {
        self.envelope = 0.0;
    }
}
