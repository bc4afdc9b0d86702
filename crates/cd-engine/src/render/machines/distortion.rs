//! Soft-clipping waveshaper.

use cd_ir::EffectKind;

use super::Machine;

pub struct Distortion {
    drive: f32,
    mix: f32,
}

impl Distortion {
    pub fn new() -> Self {
        Self {
            drive: 4.0,
            mix: 1.0,
        }
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for Distortion {
    fn kind(&self) -> EffectKind {
        EffectKind::Distortion
    }

    fn init(&mut self, _sample_rate: u32) {}

    fn set_param(&mut self, name: &str, value: f32) {
        let value = EffectKind::Distortion.clamp_param(name, value);
        match name {
            "drive" => self.drive = value,
            "mix" => self.mix = value,
            _ => {}
        }
    }

    fn work(&mut self, buffer: &mut [f32]) {
        // Normalised so a full-scale input stays at full scale.
        let norm = 1.0 / self.drive.tanh();
        for sample in buffer.iter_mut() {
            let wet = (*sample * self.drive).tanh() * norm;
            *sample += (wet - *sample) * self.mix;
        }
    }

    fn stop(&mut self) {}
}
