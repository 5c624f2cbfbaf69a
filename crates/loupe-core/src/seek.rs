//! Seek tracking
//!
//! Classifies seeks against the last committed playhead position. A drag
//! on the scrubber produces many seeking events before one seeked; every
//! one of them is measured against the position the drag started from.

use crate::types::SeekEvent;
use tracing::debug;

/// Seek state for one session
#[derive(Debug, Clone)]
pub struct SeekController {
    /// Last position playback settled at
    last_committed: f64,
    seeking: bool,
    large_threshold: f64,
    /// Target of an internal micro-seek that must not count as a user seek
    pending_nudge: Option<f64>,
}

/// Tolerance when matching a seek to a pending nudge
const NUDGE_MATCH_EPSILON: f64 = 0.01;

impl SeekController {
    pub fn new(large_threshold: f64) -> Self {
        Self {
            last_committed: 0.0,
            seeking: false,
            large_threshold,
            pending_nudge: None,
        }
    }

    pub fn is_seeking(&self) -> bool {
        self.seeking
    }

    /// Last known playhead position
    pub fn last_known_time(&self) -> f64 {
        self.last_committed
    }

    /// A seek started towards `to`
    pub fn on_seeking(&mut self, to: f64) -> SeekEvent {
        self.seeking = true;
        let delta = to - self.last_committed;
        let event = SeekEvent {
            from_time: self.last_committed,
            to_time: to,
            delta,
            large_backward: delta < -self.large_threshold,
        };
        debug!(from = event.from_time, to, delta, large_backward = event.large_backward, "Seek started");
        event
    }

    /// The seek completed at `time`
    pub fn commit(&mut self, time: f64) {
        self.seeking = false;
        self.last_committed = time;
    }

    /// Periodic playhead report; ignored mid-seek
    pub fn observe_time(&mut self, time: f64) {
        if !self.seeking {
            self.last_committed = time;
        }
    }

    /// Remember an internal micro-seek target
    pub fn expect_nudge(&mut self, target: f64) {
        self.pending_nudge = Some(target);
    }

    /// Is a seek to `time` the pending micro-seek
    pub fn is_nudge(&self, time: f64) -> bool {
        self.pending_nudge
            .is_some_and(|target| (target - time).abs() < NUDGE_MATCH_EPSILON)
    }

    /// The micro-seek completed
    pub fn finish_nudge(&mut self, time: f64) -> bool {
        if self.pending_nudge.take().is_some() {
            self.last_committed = time;
            true
        } else {
            false
        }
    }
}
