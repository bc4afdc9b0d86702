//! Automation lanes: sparse, time-ordered target values for one mixer
//! parameter.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::project::{clamp_pan, clamp_volume};

/// Mixer parameter an automation lane drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutomationParam {
    Volume,
    Pan,
}

impl AutomationParam {
    /// Clamp a value into the parameter's valid range.
    pub fn clamp(self, value: f32) -> f32 {
        match self {
            AutomationParam::Volume => clamp_volume(value),
            AutomationParam::Pan => clamp_pan(value),
        }
    }
}

/// A control point: target value at a beat.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    /// Absolute beat
    pub time: f64,
    pub value: f32,
}

impl AutomationPoint {
    pub fn new(time: f64, value: f32) -> Self {
        Self { time, value }
    }
}

/// An automation lane.
///
/// Points are expected in time order, but hosts in the middle of an edit
/// may hand over unsorted points; readers go through
/// [`AutomationLane::sorted_points`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationLane {
    pub parameter: AutomationParam,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub points: Vec<AutomationPoint>,
}

fn enabled_default() -> bool {
    true
}

impl AutomationLane {
    pub fn new(parameter: AutomationParam) -> Self {
        Self {
            parameter,
            enabled: true,
            points: Vec::new(),
        }
    }

    /// Builder-style: append a point.
    pub fn with_point(mut self, time: f64, value: f32) -> Self {
        self.points.push(AutomationPoint::new(time, value));
        self
    }

    pub fn is_sorted(&self) -> bool {
        self.points.windows(2).all(|w| w[0].time <= w[1].time)
    }

    /// Points in time order with NaN times dropped. Borrows when the stored
    /// points are already usable as-is.
    pub fn sorted_points(&self) -> Cow<'_, [AutomationPoint]> {
        let clean = self.points.iter().all(|p| !p.time.is_nan());
        if clean && self.is_sorted() {
            return Cow::Borrowed(&self.points);
        }
        let mut points: Vec<AutomationPoint> = self
            .points
            .iter()
            .copied()
            .filter(|p| !p.time.is_nan())
            .collect();
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        Cow::Owned(points)
    }

    /// Linearly interpolated (and clamped) value at `beat`. Before the first
    /// point the first value holds; after the last point the last value
    /// holds. `None` for an empty lane.
    pub fn value_at(&self, beat: f64) -> Option<f32> {
        let points = self.sorted_points();
        let first = points.first()?;
        if beat <= first.time {
            return Some(self.parameter.clamp(first.value));
        }
        let idx = points.partition_point(|p| p.time <= beat);
        let prev = points[idx - 1];
        let Some(next) = points.get(idx) else {
            return Some(self.parameter.clamp(prev.value));
        };
        let span = next.time - prev.time;
        let value = if span <= 0.0 {
            next.value
        } else {
            let t = ((beat - prev.time) / span) as f32;
            prev.value + (next.value - prev.value) * t
        };
        Some(self.parameter.clamp(value))
    }
}
