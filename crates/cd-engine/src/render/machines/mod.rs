//! Built-in effect processors.

mod compressor;
mod delay;
mod distortion;
mod equalizer;
mod filter;
mod reverb;

use std::collections::BTreeMap;

use cd_ir::EffectKind;

pub use compressor::Compressor;
pub use delay::Delay;
pub use distortion::Distortion;
pub use equalizer::Equalizer;
pub use filter::Filter;
pub use reverb::Reverb;

/// Core trait for effect processors.
///
/// `work` receives interleaved stereo and processes it in place. It must
/// not allocate; buffers are sized in `init`.
pub trait Machine: Send {
    fn kind(&self) -> EffectKind;
    fn init(&mut self, sample_rate: u32);
    fn set_param(&mut self, name: &str, value: f32);
    fn work(&mut self, buffer: &mut [f32]);
    /// Clear internal state (tails, envelopes).
    fn stop(&mut self);
}

/// Create and initialise a processor with its resolved parameter set.
pub fn create_machine(
    kind: EffectKind,
    params: &BTreeMap<String, f32>,
    sample_rate: u32,
) -> Box<dyn Machine> {
    let mut machine: Box<dyn Machine> = match kind {
        EffectKind::Equalizer => Box::new(Equalizer::new()),
        EffectKind::Compressor => Box::new(Compressor::new()),
        EffectKind::Delay => Box::new(Delay::new()),
        EffectKind::Reverb => Box::new(Reverb::new()),
        EffectKind::Distortion => Box::new(Distortion::new()),
        EffectKind::Filter => Box::new(Filter::new()),
    };
    machine.init(sample_rate);
    for (name, value) in params {
        machine.set_param(name, kind.clamp_param(name, *value));
    }
    machine
}

/// Coefficient of a one-pole smoother with time constant `seconds`.
pub(crate) fn time_coefficient(seconds: f32, sample_rate: u32) -> f32 {
    if seconds <= 0.0 || sample_rate == 0 {
        return 0.0;
    }
    (-1.0 / (seconds * sample_rate as f32)).exp()
}

pub(crate) fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}
