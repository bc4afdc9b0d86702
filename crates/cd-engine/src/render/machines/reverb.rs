//! Schroeder reverb: parallel feedback combs into series all-passes,
//! run on the mono sum and spread back to both channels.

use cd_ir::EffectKind;

use super::Machine;

/// Comb lengths in milliseconds (mutually prime at 44.1 kHz).
const COMB_MS: [f32; 4] = [29.7, 37.1, 41.1, 43.7];
const ALLPASS_MS: [f32; 2] = [5.0, 1.7];
const ALLPASS_GAIN: f32 = 0.5;

struct Line {
    buf: Vec<f32>,
    pos: usize,
}

impl Line {
    fn new(ms: f32, sample_rate: u32) -> Self {
        let len = ((ms / 1000.0) * sample_rate as f32).round().max(1.0) as usize;
        Self {
            buf: vec![0.0; len],
            pos: 0,
        }
    }

    #[inline]
    fn comb(&mut self, input: f32, feedback: f32) -> f32 {
        let out = self.buf[self.pos];
        self.buf[self.pos] = input + out * feedback;
        self.pos = (self.pos + 1) % self.buf.len();
        out
    }

    #[inline]
    fn allpass(&mut self, input: f32) -> f32 {
        let delayed = self.buf[self.pos];
        let out = delayed - input * ALLPASS_GAIN;
        self.buf[self.pos] = input + delayed * ALLPASS_GAIN;
        self.pos = (self.pos + 1) % self.buf.len();
        out
    }

    fn clear(&mut self) {
        self.buf.iter_mut().for_each(|s| *s = 0.0);
    }
}

pub struct Reverb {
    combs: Vec<Line>,
    allpasses: Vec<Line>,
    decay: f32,
    mix: f32,
}

impl Reverb {
    pub fn new() -> Self {
        Self {
            combs: Vec::new(),
            allpasses: Vec::new(),
            decay: 0.7,
            mix: 0.3,
        }
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for Reverb {
    fn kind(&self) -> EffectKind {
        EffectKind::Reverb
    }

    fn init(&mut self, sample_rate: u32) {
        let sample_rate = sample_rate.max(1);
        self.combs = COMB_MS.iter().map(|ms| Line::new(*ms, sample_rate)).collect();
        self.allpasses = ALLPASS_MS.iter().map(|ms| Line::new(*ms, sample_rate)).collect();
    }

    fn set_param(&mut self, name: &str, value: f32) {
        let value = EffectKind::Reverb.clamp_param(name, value);
        match name {
            "decay" => self.decay = value,
            "mix" => self.mix = value,
            _ => {}
        }
    }

    fn work(&mut self, buffer: &mut [f32]) {
        if self.combs.is_empty() {
            return;
        }
        let scale = 1.0 / self.combs.len() as f32;
        for pair in buffer.chunks_exact_mut(2) {
            let input = (pair[0] + pair[1]) * 0.5;
            let mut wet = 0.0;
            for comb in &mut self.combs {
                wet += comb.comb(input, self.decay);
            }
            wet *= scale;
            for allpass in &mut self.allpasses {
                wet = allpass.allpass(wet);
            }
            pair[0] += (wet - pair[0]) * self.mix;
            pair[1] += (wet - pair[1]) * self.mix;
        }
    }

    fn stop(&mut self) {
        self.combs.iter_mut().for_each(Line::clear);
        self.allpasses.iter_mut().for_each(Line::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_leaves_a_tail() {
        let mut r = Reverb::new();
        r.init(44100);
        r.set_param("mix", 1.0);
        let mut buf = vec![0.0f32; 2 * 8820];
        buf[0] = 1.0;
        buf[1] = 1.0;
        r.work(&mut buf);
        let tail: f32 = buf[2 * 4410..].iter().map(|s| s.abs()).sum();
        assert!(tail > 0.0);
        assert!(buf.iter().all(|s| s.is_finite() && s.abs() < 2.0));
    }

    #[test]
    fn dry_mix_is_bypass() {
        let mut r = Reverb::new();
        r.init(44100);
        r.set_param("mix", 0.0);
        let mut buf = [0.4f32, -0.4];
        r.work(&mut buf);
        assert_eq!(buf, [0.4, -0.4]);
    }
}
