//! One-pole RC low-pass filter: `y = y_prev + alpha * (x - y_prev)`.

use core::f32::consts::TAU;

use cd_ir::EffectKind;

use super::Machine;

const DEFAULT_CUTOFF: f32 = 2000.0;

pub struct Filter {
    prev_left: f32,
    prev_right: f32,
    alpha: f32,
    cutoff_hz: f32,
    sample_rate: u32,
}

impl Filter {
    pub fn new() -> Self {
        Self {
            prev_left: 0.0,
            prev_right: 0.0,
            alpha: 0.0,
            cutoff_hz: DEFAULT_CUTOFF,
            sample_rate: 44100,
        }
    }

    fn recompute_alpha(&mut self) {
        // Stable for cutoff below sr / 2π; clamp above that.
        self.alpha = (TAU * self.cutoff_hz / self.sample_rate as f32).min(1.0);
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for Filter {
    fn kind(&self) -> EffectKind {
        EffectKind::Filter
    }

    fn init(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.recompute_alpha();
    }

    fn set_param(&mut self, name: &str, value: f32) {
        if name == "cutoff" {
            self.cutoff_hz = EffectKind::Filter.clamp_param(name, value);
            self.recompute_alpha();
        }
    }

    fn work(&mut self, buffer: &mut [f32]) {
        let alpha = self.alpha;
        let mut prev_l = self.prev_left;
        let mut prev_r = self.prev_right;

        for pair in buffer.chunks_exact_mut(2) {
            prev_l += alpha * (pair[0] - prev_l);
            prev_r += alpha * (pair[1] - prev_r);
            pair[0] = prev_l;
            pair[1] = prev_r;
        }

        self.prev_left = prev_l;
        self.prev_right = prev_r;
    }

    fn stop(&mut self) {
        self.prev_left = 0.0;
        self.prev_right = 0.0;
    }
}
