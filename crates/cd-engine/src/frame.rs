//! Audio frame type.

/// A stereo audio frame, nominally in -1..1.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self {
            left: 0.0,
            right: 0.0,
        }
    }

    /// Create a mono frame (same value for both channels).
    pub const fn mono(value: f32) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Mix another frame into this one.
    #[inline]
    pub fn mix(&mut self, other: Frame) {
        self.left += other.left;
        self.right += other.right;
    }

    #[inline]
    pub fn scaled(self, gain: f32) -> Frame {
        Frame {
            left: self.left * gain,
            right: self.right * gain,
        }
    }

    /// Mean of both channels.
    #[inline]
    pub fn to_mono(self) -> f32 {
        (self.left + self.right) * 0.5
    }

    /// Convert to 16-bit PCM, clipping at full scale.
    pub fn to_i16(self) -> [i16; 2] {
        [sample_to_i16(self.left), sample_to_i16(self.right)]
    }
}

fn sample_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}
