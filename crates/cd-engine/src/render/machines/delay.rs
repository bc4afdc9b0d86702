//! Stereo feedback delay.

use cd_ir::EffectKind;

use super::Machine;

/// Longest delay time the line is sized for (seconds).
const MAX_TIME: f32 = 2.0;

pub struct Delay {
    /// Interleaved stereo ring
    line: Vec<f32>,
    write: usize,
    time: f32,
    feedback: f32,
    mix: f32,
    delay_frames: usize,
    sample_rate: u32,
}

impl Delay {
    pub fn new() -> Self {
        Self {
            line: Vec::new(),
            write: 0,
            time: 0.25,
            feedback: 0.3,
            mix: 0.3,
            delay_frames: 1,
            sample_rate: 44100,
        }
    }

    fn frames(&self) -> usize {
        self.line.len() / 2
    }

    fn recompute(&mut self) {
        let frames = (self.time * self.sample_rate as f32).round() as usize;
        self.delay_frames = frames.clamp(1, self.frames().max(2) - 1);
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for Delay {
    fn kind(&self) -> EffectKind {
        EffectKind::Delay
    }

    fn init(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        let frames = (MAX_TIME * self.sample_rate as f32) as usize + 1;
        self.line = vec![0.0; frames * 2];
        self.write = 0;
        self.recompute();
    }

    fn set_param(&mut self, name: &str, value: f32) {
        let value = EffectKind::Delay.clamp_param(name, value);
        match name {
            "time" => {
                self.time = value;
                self.recompute();
            }
            "feedback" => self.feedback = value,
            "mix" => self.mix = value,
            _ => {}
        }
    }

    fn work(&mut self, buffer: &mut [f32]) {
        let frames = self.frames();
        if frames == 0 {
            return;
        }
        for pair in buffer.chunks_exact_mut(2) {
            let read = (self.write + frames - self.delay_frames) % frames;
            for ch in 0..2 {
                let delayed = self.line[read * 2 + ch];
                let dry = pair[ch];
                self.line[self.write * 2 + ch] = dry + delayed * self.feedback;
                pair[ch] = dry + (delayed - dry) * self.mix;
            }
            self.write = (self.write + 1) % frames;
        }
    }

    fn stop(&mut self) {
        self.line.iter_mut().for_each(|s| *s = 0.0);
    }
}
