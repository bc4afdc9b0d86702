//! Sample-accurate control values for gain and pan stages.
//!
//! A timeline holds a current value plus a queue of future events. `Set`
//! events jump at their time; `Ramp` events interpolate linearly from the
//! previous anchor and arrive at their time. Scheduling an event drops
//! any queued event at or after its time.

use std::collections::VecDeque;

const QUEUE_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
enum EventKind {
    Set,
    Ramp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ControlEvent {
    time: f64,
    value: f32,
    kind: EventKind,
}

#[derive(Clone, Debug)]
pub struct ControlTimeline {
    value: f32,
    /// Time the current value was reached; start of the next ramp
    anchor: f64,
    events: VecDeque<ControlEvent>,
}

impl ControlTimeline {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            anchor: 0.0,
            events: VecDeque::with_capacity(QUEUE_CAPACITY),
        }
    }

    /// Jump to `value` at `now`, cancelling everything queued.
    pub fn set(&mut self, value: f32, now: f64) {
        self.events.clear();
        self.value = value;
        self.anchor = now;
    }

    pub fn set_at(&mut self, value: f32, time: f64) {
        self.schedule(ControlEvent {
            time,
            value,
            kind: EventKind::Set,
        });
    }

    pub fn ramp_to(&mut self, value: f32, end_time: f64) {
        self.schedule(ControlEvent {
            time: end_time,
            value,
            kind: EventKind::Ramp,
        });
    }

    fn schedule(&mut self, event: ControlEvent) {
        let keep = self.events.partition_point(|e| e.time < event.time);
        self.events.truncate(keep);
        // Stay within the reserved queue; the oldest event takes effect early.
        if self.events.len() == QUEUE_CAPACITY {
            if let Some(first) = self.events.pop_front() {
                self.value = first.value;
                self.anchor = first.time;
            }
        }
        self.events.push_back(event);
    }

    /// Value at time `t`. Times must be non-decreasing between calls;
    /// events that have passed are folded into the current value.
    pub fn value_at(&mut self, t: f64) -> f32 {
        while let Some(event) = self.events.front() {
            if event.time > t {
                break;
            }
            self.value = event.value;
            self.anchor = event.time;
            self.events.pop_front();
        }
        match self.events.front() {
            Some(next) if next.kind == EventKind::Ramp && next.time > self.anchor => {
                let progress = ((t - self.anchor) / (next.time - self.anchor)).clamp(0.0, 1.0);
                self.value + (next.value - self.value) * progress as f32
            }
            _ => self.value,
        }
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }
}
