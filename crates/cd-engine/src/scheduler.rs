//! Look-ahead event scheduling.
//!
//! On every tick the scheduler walks forward from a monotonically
//! advancing beat cursor, in windows of half the look-ahead, until the
//! cursor's device time is at least one look-ahead ahead of the device
//! clock. Windows are half-open and contiguous, so every beat is covered
//! exactly once: no note is skipped and none fires twice.
//!
//! Already-issued triggers are never retracted. Pausing keeps the cursor,
//! so notes handed to the runtime just before a pause are not issued again
//! on resume.

use cd_ir::{Project, TrackKind, TOTAL_BEATS};

use crate::config::EngineConfig;
use crate::frequency::{pitch_to_frequency, velocity_to_amplitude, waveform_for_instrument};
use crate::graph::SignalGraph;
use crate::runtime::{AudioRuntime, StageCommand, VoiceTrigger};
use crate::transport::{Transport, TransportStep};

/// A beat range to schedule, with its mapping to device time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window {
    /// Device time of beat 0 for the cycle this window belongs to
    pub origin: f64,
    /// Inclusive
    pub start_beat: f64,
    /// Exclusive
    pub end_beat: f64,
    pub seconds_per_beat: f64,
    /// First window after the cursor was (re)positioned
    pub fresh: bool,
}

impl Window {
    /// Device time of a beat in this window's cycle.
    #[inline]
    pub fn time_of(&self, beat: f64) -> f64 {
        self.origin + beat * self.seconds_per_beat
    }

    #[inline]
    pub fn contains(&self, beat: f64) -> bool {
        beat >= self.start_beat && beat < self.end_beat
    }
}

/// Next unscheduled beat.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Cursor {
    next_beat: f64,
    /// Loop cycle of `next_beat` relative to the transport's current one:
    /// 1 when scheduling ran ahead past the loop end, -1 when the transport
    /// wrapped before the previous cycle was fully scheduled
    cycle: i32,
    fresh: bool,
}

impl Cursor {
    fn at(beat: f64) -> Self {
        Self {
            next_beat: beat,
            cycle: 0,
            fresh: true,
        }
    }
}

/// What a scheduler tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Transport not playing.
    Idle,
    Running,
    /// Looped back to the start during this tick.
    Wrapped,
    /// Reached the end of a non-looping project and stopped.
    Ended,
}

/// A note found in a window, before conversion to a trigger.
#[derive(Clone, Copy, Debug)]
struct PendingNote {
    beat: f64,
    end_beat: f64,
    pitch: u8,
    velocity: u8,
}

/// The event scheduler.
#[derive(Debug, Default)]
pub struct Scheduler {
    cursor: Option<Cursor>,
    /// Per-track scratch, reused across ticks
    pending: Vec<PendingNote>,
    /// Notes issued since creation
    triggered: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart scheduling at `beat` (after play from stop, or a seek).
    pub fn rewind(&mut self, beat: f64) {
        self.cursor = Some(Cursor::at(beat.max(0.0)));
    }

    /// Restart at `beat` unless a cursor is already held (resume after
    /// pause).
    pub fn resume_at(&mut self, beat: f64) {
        if self.cursor.is_none() {
            self.rewind(beat);
        }
    }

    /// Forget the cursor (stop).
    pub fn clear(&mut self) {
        self.cursor = None;
    }

    /// Next beat that has not been scheduled yet.
    pub fn next_beat(&self) -> Option<f64> {
        self.cursor.map(|c| c.next_beat)
    }

    /// Total notes issued.
    pub fn triggered(&self) -> u64 {
        self.triggered
    }

    /// Advance the transport to `now` and hand every due window to `emit`,
    /// in time order.
    pub fn advance(
        &mut self,
        transport: &mut Transport,
        now: f64,
        config: &EngineConfig,
        mut emit: impl FnMut(&Window),
    ) -> TickOutcome {
        let outcome = match transport.advance(now) {
            TransportStep::Idle => return TickOutcome::Idle,
            TransportStep::Ended => {
                self.clear();
                return TickOutcome::Ended;
            }
            TransportStep::Wrapped => {
                let total = transport.total_duration();
                let spb = transport.seconds_per_beat();
                match self.cursor.as_mut() {
                    Some(cursor) => {
                        // The transport origin moved one cycle forward.
                        cursor.cycle -= 1;
                        let due = transport.origin()
                            + f64::from(cursor.cycle) * total
                            + cursor.next_beat * spb;
                        // More than a whole cycle behind; pick up where
                        // playback is.
                        if cursor.cycle < -1 || due < now - total {
                            self.rewind(transport.position_beats());
                        }
                    }
                    None => self.rewind(transport.position_beats()),
                }
                TickOutcome::Wrapped
            }
            TransportStep::Running => TickOutcome::Running,
        };

        let spb = transport.seconds_per_beat();
        let window_beats = config.window() / spb;
        let horizon = now + config.lookahead;
        let cursor = self
            .cursor
            .get_or_insert_with(|| Cursor::at(transport.position_beats()));

        loop {
            let origin = transport.origin() + f64::from(cursor.cycle) * transport.total_duration();
            if origin + cursor.next_beat * spb >= horizon {
                break;
            }
            if cursor.next_beat >= TOTAL_BEATS {
                if transport.looping() && cursor.cycle < 1 {
                    cursor.cycle += 1;
                    cursor.next_beat = 0.0;
                    cursor.fresh = true;
                    continue;
                }
                break;
            }
            let end_beat = (cursor.next_beat + window_beats).min(TOTAL_BEATS);
            emit(&Window {
                origin,
                start_beat: cursor.next_beat,
                end_beat,
                seconds_per_beat: spb,
                fresh: cursor.fresh,
            });
            cursor.next_beat = end_beat;
            cursor.fresh = false;
        }
        outcome
    }

    /// Issue a trigger for every note of every audible note track whose
    /// absolute start falls in `window`. Per track, triggers go out in time
    /// order. Returns the number of triggers issued.
    ///
    /// Muted tracks, and unsoloed tracks while any track is soloed, are
    /// never scanned.
    pub fn schedule_notes<R: AudioRuntime>(
        &mut self,
        window: &Window,
        project: &Project,
        graph: &mut SignalGraph,
        runtime: &mut R,
    ) -> usize {
        let mut issued = 0;
        for track in project.audible_tracks() {
            if track.kind != TrackKind::Note {
                continue;
            }

            self.pending.clear();
            for clip in &track.clips {
                let clip_end = clip.end_time();
                for note in &clip.notes {
                    let beat = note.absolute_start(clip);
                    if beat >= clip_end || !window.contains(beat) {
                        continue;
                    }
                    self.pending.push(PendingNote {
                        beat,
                        end_beat: (beat + note.duration.max(0.0)).min(clip_end),
                        pitch: note.pitch,
                        velocity: note.velocity,
                    });
                }
            }
            if self.pending.is_empty() {
                continue;
            }
            self.pending.sort_by(|a, b| a.beat.total_cmp(&b.beat));

            let dest = graph.ensure_track_graph(track.id, runtime).gain;
            let waveform = waveform_for_instrument(&track.instrument_name);
            for note in &self.pending {
                let start = window.time_of(note.beat);
                runtime.submit(StageCommand::Trigger {
                    dest,
                    voice: VoiceTrigger {
                        frequency: pitch_to_frequency(note.pitch),
                        amplitude: velocity_to_amplitude(note.velocity),
                        start,
                        stop: window.time_of(note.end_beat).max(start),
                        waveform,
                    },
                });
            }
            issued += self.pending.len();
        }
        self.triggered += issued as u64;
        issued
    }
}
