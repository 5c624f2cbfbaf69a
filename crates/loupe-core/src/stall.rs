//! Stall detection
//!
//! Tracks buffering stalls reported by the primitive and silent frozen
//! frames, where the decoder wedges without ever reporting a stall. The
//! detector only keeps state; the session arms the timers and carries out
//! recovery.

use std::time::Duration;
use tracing::{debug, warn};

/// Result of a frozen-frame poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrozenCheck {
    /// The playhead advanced; keep polling
    Advancing,
    /// The playhead did not advance while playing
    Frozen,
    /// The watch window of this playing segment is over
    Expired,
    /// Nothing is being watched
    Idle,
}

/// Result of a stall watchdog expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogExpiry {
    /// Playback resumed before the watchdog fired
    Resumed,
    /// First expiry of this buffering episode; carries the new stall count
    NewStall(u32),
    /// The same episode is still buffering; the count is unchanged
    StillStalled(u32),
}

#[derive(Debug, Clone, Copy)]
struct FrozenWatch {
    started_at: Duration,
    last_time: f64,
}

/// Stall detector state for one session
#[derive(Debug, Clone)]
pub struct StallDetector {
    buffering: bool,
    /// The current buffering episode has been counted
    counted: bool,
    stall_count: u32,
    watchdog: Duration,
    frozen: Option<FrozenWatch>,
    frozen_window: Duration,
    frozen_epsilon: f64,
}

impl StallDetector {
    pub fn new(watchdog: Duration, frozen_window: Duration, frozen_epsilon: f64) -> Self {
        Self {
            buffering: false,
            counted: false,
            stall_count: 0,
            watchdog,
            frozen: None,
            frozen_window,
            frozen_epsilon,
        }
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn stall_count(&self) -> u32 {
        self.stall_count
    }

    /// Watchdog delay for this platform
    pub fn watchdog(&self) -> Duration {
        self.watchdog
    }

    /// The primitive reported waiting
    pub fn on_waiting(&mut self) {
        if !self.buffering {
            self.counted = false;
        }
        self.buffering = true;
        self.frozen = None;
    }

    /// The watchdog expired. Each buffering episode adds to the stall
    /// count once, however many times the watchdog fires during it.
    pub fn on_watchdog_expired(&mut self) -> WatchdogExpiry {
        if !self.buffering {
            return WatchdogExpiry::Resumed;
        }
        if self.counted {
            debug!(stall_count = self.stall_count, "Still stalled");
            return WatchdogExpiry::StillStalled(self.stall_count);
        }
        self.counted = true;
        self.stall_count += 1;
        warn!(stall_count = self.stall_count, "Playback stalled");
        WatchdogExpiry::NewStall(self.stall_count)
    }

    /// The primitive reported playing or can-play
    pub fn on_resumed(&mut self) {
        self.buffering = false;
    }

    /// A seek superseded any pending stall
    pub fn on_seek(&mut self) {
        self.buffering = false;
        self.frozen = None;
    }

    /// The sustained-health window elapsed without a stall
    pub fn reset_count(&mut self) {
        if self.stall_count > 0 {
            debug!(stall_count = self.stall_count, "Stall count reset after healthy playback");
        }
        self.stall_count = 0;
    }

    /// Start watching a playing segment for frozen frames
    pub fn start_frozen_watch(&mut self, now: Duration, current_time: f64) {
        self.frozen = Some(FrozenWatch {
            started_at: now,
            last_time: current_time,
        });
    }

    pub fn stop_frozen_watch(&mut self) {
        self.frozen = None;
    }

    pub fn is_watching_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// Compare the playhead against the previous poll
    pub fn check_frozen(&mut self, now: Duration, current_time: f64, paused: bool) -> FrozenCheck {
        let Some(watch) = self.frozen.as_mut() else {
            return FrozenCheck::Idle;
        };

        let advanced = current_time - watch.last_time;
        watch.last_time = current_time;

        if !paused && !self.buffering && advanced < self.frozen_epsilon {
            warn!(current_time, advanced, "Playhead frozen while playing");
            return FrozenCheck::Frozen;
        }
        if now.saturating_sub(watch.started_at) >= self.frozen_window {
            self.frozen = None;
            return FrozenCheck::Expired;
        }
        FrozenCheck::Advancing
    }

    /// The watch window is still open at `now`
    pub fn frozen_window_open(&self, now: Duration) -> bool {
        self.frozen
            .is_some_and(|w| now.saturating_sub(w.started_at) < self.frozen_window)
    }
}
