//! Beat ↔ seconds conversion on the fixed project grid.

/// Bars in the project grid.
pub const BARS: u32 = 32;

/// Beats per bar.
pub const BEATS_PER_BAR: u32 = 4;

/// Total project length in beats (32 bars × 4 beats).
pub const TOTAL_BEATS: f64 = (BARS * BEATS_PER_BAR) as f64;

/// Lowest tempo accepted before conversion; guards against division by zero.
const MIN_BPM: f64 = 1.0;

/// Duration of one beat in seconds.
#[inline]
pub fn seconds_per_beat(bpm: f64) -> f64 {
    60.0 / bpm.max(MIN_BPM)
}

#[inline]
pub fn beats_to_seconds(beats: f64, bpm: f64) -> f64 {
    beats * seconds_per_beat(bpm)
}

#[inline]
pub fn seconds_to_beats(seconds: f64, bpm: f64) -> f64 {
    seconds / seconds_per_beat(bpm)
}

/// Length of the whole loop grid in seconds.
#[inline]
pub fn total_duration(bpm: f64) -> f64 {
    beats_to_seconds(TOTAL_BEATS, bpm)
}
