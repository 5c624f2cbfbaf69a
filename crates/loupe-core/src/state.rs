//! Playback state machine
//!
//! ```text
//! Initializing ─► Loading ─► Ready ◄──► Playing
//!                    │         ▲  ▲        ▲
//!                    │         │  └─► Buffering ◄──► Seeking
//!                    ▼         └────────────────────────┘
//!                  Error            (any) ─► Error | Destroyed
//! ```

use crate::types::PlaybackStatus;
use serde::{Deserialize, Serialize};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Session created, nothing loaded
    Initializing,
    /// Loading the manifest
    Loading,
    /// Loaded and able to play, not currently playing
    Ready,
    /// Playback progressing
    Playing,
    /// Stalled waiting for data
    Buffering,
    /// Seek in progress
    Seeking,
    /// Terminal failure for this session
    Error,
    /// Torn down
    Destroyed,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        match (self, target) {
            (Destroyed, _) => false,
            (Error, Destroyed) => true,
            (Error, _) => false,
            (_, Error) | (_, Destroyed) => true,
            _ => matches!(
                (self, target),
                // From Initializing
                (Initializing, Loading) | (Initializing, Ready) |
                // From Loading
                (Loading, Ready) |
                // From Ready
                (Ready, Playing) | (Ready, Buffering) | (Ready, Seeking) |
                // From Playing
                (Playing, Ready) | (Playing, Buffering) | (Playing, Seeking) |
                // From Buffering
                (Buffering, Playing) | (Buffering, Ready) | (Buffering, Seeking) |
                // From Seeking
                (Seeking, Playing) | (Seeking, Ready) | (Seeking, Buffering)
            ),
        }
    }

    /// Loaded and not terminal
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Buffering | PlaybackState::Seeking
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Error | PlaybackState::Destroyed)
    }

    /// Project onto the status the host UI renders
    pub fn status(&self, error_message: Option<&str>) -> PlaybackStatus {
        match self {
            PlaybackState::Initializing
            | PlaybackState::Loading
            | PlaybackState::Buffering
            | PlaybackState::Seeking => PlaybackStatus::Buffering,
            PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Destroyed => PlaybackStatus::Ready,
            PlaybackState::Error => PlaybackStatus::Error {
                message: error_message.unwrap_or("Playback failed").to_string(),
            },
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Initializing => write!(f, "initializing"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Seeking => write!(f, "seeking"),
            PlaybackState::Error => write!(f, "error"),
            PlaybackState::Destroyed => write!(f, "destroyed"),
        }
    }
}
