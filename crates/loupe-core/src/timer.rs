//! Cancellable single-slot timers on the session clock
//!
//! Each [`TimerKind`] has at most one armed instance. Arming replaces the
//! previous instance, and every arm gets a fresh generation so that a due
//! timer which was cancelled or re-armed in the meantime is recognised as
//! stale when it is claimed.

use std::collections::BTreeMap;
use std::time::Duration;

/// The kinds of timers a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    StallWatchdog,
    StallCountReset,
    SeekDebounce,
    RestoreAuto,
    FrozenFramePoll,
    BufferWarmup,
}

/// Handle to one armed instance of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub kind: TimerKind,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    generation: u64,
    deadline: Duration,
}

/// Timer slots for one session
#[derive(Debug, Default)]
pub struct Timers {
    armed: BTreeMap<TimerKind, Armed>,
    generation: u64,
    closed: bool,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire at `deadline`, replacing any armed instance.
    ///
    /// After [`Timers::close`] nothing is armed and the returned token can
    /// never be claimed.
    pub fn arm(&mut self, kind: TimerKind, deadline: Duration) -> TimerToken {
        self.generation += 1;
        let token = TimerToken {
            kind,
            generation: self.generation,
        };
        if !self.closed {
            self.armed.insert(
                kind,
                Armed {
                    generation: token.generation,
                    deadline,
                },
            );
        }
        token
    }

    /// Cancel `kind`; returns whether an instance was armed
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.armed.remove(&kind).is_some()
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Duration> {
        self.armed.get(&kind).map(|a| a.deadline)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<Duration> {
        self.armed.values().map(|a| a.deadline).min()
    }

    /// Tokens due at `now`, earliest first. Nothing is removed; each token
    /// must be claimed before acting on it.
    pub fn due(&self, now: Duration) -> Vec<TimerToken> {
        let mut due: Vec<(Duration, TimerToken)> = self
            .armed
            .iter()
            .filter(|(_, a)| a.deadline <= now)
            .map(|(kind, a)| {
                (
                    a.deadline,
                    TimerToken {
                        kind: *kind,
                        generation: a.generation,
                    },
                )
            })
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);
        due.into_iter().map(|(_, token)| token).collect()
    }

    /// Disarm the timer if `token` is still its current instance.
    ///
    /// Returns false for stale tokens, which must be treated as no-ops.
    pub fn claim(&mut self, token: TimerToken) -> bool {
        match self.armed.get(&token.kind) {
            Some(armed) if armed.generation == token.generation => {
                self.armed.remove(&token.kind);
                true
            }
            _ => false,
        }
    }

    /// Cancel everything and refuse further arms. Returns how many timers
    /// were cancelled; a second call returns 0.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        let cancelled = self.armed.len();
        self.armed.clear();
        cancelled
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
