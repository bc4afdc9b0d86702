//! Note-to-voice conversions: pitch to frequency, velocity to amplitude,
//! instrument name to oscillator shape.

use crate::runtime::Waveform;

/// MIDI note of the tuning reference (A4).
const REFERENCE_NOTE: i32 = 69;

/// Frequency of the reference note in Hz.
const REFERENCE_HZ: f32 = 440.0;

/// 2^(n/12) for n in 0..12.
const SEMITONE_RATIO: [f32; 12] = [
    1.0,
    1.059_463_1,
    1.122_462,
    1.189_207_1,
    1.259_921,
    1.334_839_8,
    1.414_213_6,
    1.498_307_1,
    1.587_401,
    1.681_792_9,
    1.781_797_4,
    1.887_748_6,
];

/// Convert a MIDI note number to a frequency in Hz using 12-TET.
///
/// Note 69 = 440 Hz, note 60 ≈ 261.63 Hz.
pub fn pitch_to_frequency(pitch: u8) -> f32 {
    let semitones = pitch as i32 - REFERENCE_NOTE;
    // Table lookup for the position within the octave, then whole octaves
    // by power of two.
    let octaves = semitones.div_euclid(12);
    let remainder = semitones.rem_euclid(12) as usize;
    REFERENCE_HZ * SEMITONE_RATIO[remainder] * 2f32.powi(octaves)
}

/// Convert a 0-127 velocity to a linear amplitude in 0..1.
pub fn velocity_to_amplitude(velocity: u8) -> f32 {
    velocity.min(127) as f32 / 127.0
}

/// Pick an oscillator shape from an instrument name.
pub fn waveform_for_instrument(name: &str) -> Waveform {
    let name = name.to_ascii_lowercase();
    if name.contains("bass") || name.contains("saw") {
        Waveform::Saw
    } else if name.contains("lead") || name.contains("square") || name.contains("chip") {
        Waveform::Square
    } else if name.contains("pad") || name.contains("string") || name.contains("tri") {
        Waveform::Triangle
    } else {
        Waveform::Sine
    }
}
