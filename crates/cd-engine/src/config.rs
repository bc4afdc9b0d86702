//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

/// Timing and resource settings for the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How far ahead of the device clock events are scheduled (seconds)
    pub lookahead: f64,
    /// Intended interval between scheduler ticks (seconds)
    pub tick_interval: f64,
    /// Meter waveform length in samples
    pub meter_window: usize,
    /// Maximum simultaneous voices in the render runtime
    pub max_voices: usize,
    /// Voice release fade (seconds)
    pub release_time: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead: 0.1,
            tick_interval: 0.025,
            meter_window: 1024,
            max_voices: 64,
            release_time: 0.005,
        }
    }
}

impl EngineConfig {
    /// Copy with every field forced into a workable range. The look-ahead
    /// window must cover at least two tick intervals.
    pub fn validated(&self) -> Self {
        let defaults = Self::default();
        let tick_interval = positive_or(self.tick_interval, defaults.tick_interval);
        let lookahead = positive_or(self.lookahead, defaults.lookahead).max(tick_interval * 2.0);
        Self {
            lookahead,
            tick_interval,
            meter_window: self.meter_window.clamp(32, 16384),
            max_voices: self.max_voices.clamp(1, 512),
            release_time: if self.release_time.is_finite() {
                self.release_time.clamp(0.0, 1.0)
            } else {
                defaults.release_time
            },
        }
    }

    /// Width of one scheduling window in seconds.
    pub fn window(&self) -> f64 {
        self.lookahead / 2.0
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}
