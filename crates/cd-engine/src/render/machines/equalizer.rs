//! Three-band equalizer built from two one-pole crossovers.
//!
//! low = lp(250 Hz), high = x - lp(4 kHz), mid = the remainder. With every
//! band at 0 dB the bands sum back to the input exactly.

use core::f32::consts::TAU;

use cd_ir::EffectKind;

use super::{db_to_gain, Machine};

const LOW_CROSSOVER: f32 = 250.0;
const HIGH_CROSSOVER: f32 = 4000.0;

#[derive(Clone, Copy, Default)]
struct Crossover {
    low: [f32; 2],
    upper: [f32; 2],
}

pub struct Equalizer {
    state: Crossover,
    low_alpha: f32,
    high_alpha: f32,
    gains: [f32; 3],
}

impl Equalizer {
    pub fn new() -> Self {
        Self {
            state: Crossover::default(),
            low_alpha: 0.0,
            high_alpha: 0.0,
            gains: [1.0; 3],
        }
    }
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn alpha(cutoff: f32, sample_rate: u32) -> f32 {
    (TAU * cutoff / sample_rate.max(1) as f32).min(1.0)
}

impl Machine for Equalizer {
    fn kind(&self) -> EffectKind {
        EffectKind::Equalizer
    }

    fn init(&mut self, sample_rate: u32) {
        self.low_alpha = alpha(LOW_CROSSOVER, sample_rate);
        self.high_alpha = alpha(HIGH_CROSSOVER, sample_rate);
    }

    fn set_param(&mut self, name: &str, value: f32) {
        let band = match name {
            "low" => 0,
            "mid" => 1,
            "high" => 2,
            _ => return,
        };
        self.gains[band] = db_to_gain(EffectKind::Equalizer.clamp_param(name, value));
    }

    fn work(&mut self, buffer: &mut [f32]) {
        let [g_low, g_mid, g_high] = self.gains;
        for pair in buffer.chunks_exact_mut(2) {
            for (ch, sample) in pair.iter_mut().enumerate() {
                let x = *sample;
                self.state.low[ch] += self.low_alpha * (x - self.state.low[ch]);
                self.state.upper[ch] += self.high_alpha * (x - self.state.upper[ch]);
                let low = self.state.low[ch];
                let high = x - self.state.upper[ch];
                let mid = x - low - high;
                *sample = low * g_low + mid * g_mid + high * g_high;
            }
        }
    }

    fn stop(&mut self) {
        self.state = Crossover::default();
    }
}
