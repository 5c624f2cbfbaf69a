//! Session event emission
//!
//! Every notable controller decision is published as an
//! [`EventRecord`] on a broadcast channel. Subscribers that fall behind
//! lose the oldest records; the controller never waits on them.

use crate::primitive::duration_ms;
use crate::state::PlaybackState;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Controller decisions worth recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Lifecycle transition
    StateChanged { from: PlaybackState, to: PlaybackState },

    /// Manifest loaded and initial rendition chosen
    ManifestLoaded {
        renditions: usize,
        is_live: bool,
        network: NetworkClass,
        initial_index: Option<usize>,
        auto_enabled: bool,
    },

    /// A stall was detected and recovered from
    Stall(StallEvent),

    /// The viewer seeked
    Seek(SeekEvent),

    /// A rendition was pinned, disabling automatic selection
    RenditionPinned { index: usize, reason: PinReason },

    /// Automatic selection re-enabled
    AutoSelectionRestored,

    /// Automatic mode switched level on throughput
    AutoLevelSwitched { index: usize, estimate_bps: Option<u64> },

    /// Buffer targets applied to the loader
    BufferTargetsChanged(BufferTargets),

    /// A collaborator error was retried
    ErrorRecovery {
        code: String,
        attempt: u32,
    },

    /// Terminal failure
    Fatal { code: String, message: String },

    /// Session torn down
    Destroyed { timers_cancelled: usize },
}

/// Event with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub session_id: SessionId,
    /// Sequence number within the session
    pub sequence: u64,
    /// Session clock
    #[serde(with = "duration_ms")]
    pub at: Duration,
    /// Wall-clock timestamp
    pub wall: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Event emitter for one session
#[derive(Debug)]
pub struct EventEmitter {
    session_id: SessionId,
    sequence: u64,
    tx: broadcast::Sender<EventRecord>,
    /// Every record, kept when history is enabled
    history: Option<Vec<EventRecord>>,
}

impl EventEmitter {
    pub fn new(session_id: SessionId) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session_id,
            sequence: 0,
            tx,
            history: None,
        }
    }

    /// Keep a copy of every record for later inspection
    pub fn with_history(mut self) -> Self {
        self.history = Some(Vec::new());
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tx.subscribe()
    }

    pub fn emit(&mut self, at: Duration, event: SessionEvent) {
        self.sequence += 1;
        let record = EventRecord {
            session_id: self.session_id,
            sequence: self.sequence,
            at,
            wall: Utc::now(),
            event,
        };
        trace!(sequence = record.sequence, event = ?record.event, "Session event");
        if let Some(history) = self.history.as_mut() {
            history.push(record.clone());
        }
        // No subscribers is fine
        let _ = self.tx.send(record);
    }

    /// Recorded events, if history is enabled
    pub fn history(&self) -> &[EventRecord] {
        self.history.as_deref().unwrap_or(&[])
    }
}
