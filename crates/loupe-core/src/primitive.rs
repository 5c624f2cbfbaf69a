//! Collaborator interfaces
//!
//! The controller drives two host-provided primitives and reacts to the
//! events they emit:
//! - [`PlaybackPrimitive`]: the media element (play, playhead, paused)
//! - [`FragmentLoader`]: the segmented-media delivery engine (fragment
//!   loading, level selection, buffer configuration)
//!
//! Calls into either primitive never fail synchronously; failures come back
//! as [`PlayerEvent::Error`].

use crate::manifest::Manifest;
use crate::types::{BufferTargets, Rendition};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// The host media element
pub trait PlaybackPrimitive: Send {
    /// Hand the source to the element directly (native playback only)
    fn attach_source(&mut self, source: &Url, poster: Option<&Url>);

    fn play(&mut self);

    fn set_muted(&mut self, muted: bool);

    /// Playhead in seconds
    fn current_time(&self) -> f64;

    /// Move the playhead; the element answers with seeking/seeked events
    fn set_current_time(&mut self, time: f64);

    fn paused(&self) -> bool;
}

/// The segmented-media delivery engine.
///
/// Level indices follow the loader convention: `-1` means automatic
/// selection. Only the rendition selector writes level fields.
pub trait FragmentLoader: Send {
    /// Bind the parsed manifest; fragment loading starts with `start_load`
    fn load_source(&mut self, manifest: &Manifest);

    /// Start or resume fragment loading (idempotent)
    fn start_load(&mut self);

    /// Stop issuing fragment requests (idempotent, resumable)
    fn stop_load(&mut self);

    /// Ordered renditions known to the loader
    fn levels(&self) -> &[Rendition];

    fn current_level(&self) -> i64;

    fn set_current_level(&mut self, level: i64);

    fn auto_level_enabled(&self) -> bool;

    fn set_auto_level_enabled(&mut self, enabled: bool);

    /// Level the loader's automatic mode should fetch next
    fn set_next_auto_level(&mut self, level: usize);

    fn set_buffer_targets(&mut self, targets: &BufferTargets);

    /// Attempt to recover the media pipeline after a decode error
    fn recover_media_error(&mut self);

    /// Release every resource; no events are emitted afterwards
    fn destroy(&mut self);
}

/// Classification of a collaborator failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaErrorKind {
    /// Manifest (re)load failed
    Manifest,
    /// Fragment fetch failed
    Network,
    /// Decoder failure
    Decode,
    Other,
}

/// A failure reported by the primitive or the loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaError {
    pub kind: MediaErrorKind,
    /// The collaborator gave up on its own retries
    pub fatal: bool,
    pub details: String,
}

impl MediaError {
    pub fn fatal(kind: MediaErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            fatal: true,
            details: details.into(),
        }
    }

    pub fn non_fatal(kind: MediaErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            fatal: false,
            details: details.into(),
        }
    }
}

/// Events the controller consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Playback halted waiting for data
    Waiting,
    /// Playback is progressing
    Playing,
    /// Enough data is available to play
    CanPlay,
    /// A seek started; the target is the primitive's current time
    Seeking,
    /// A seek completed
    Seeked,
    Pause,
    /// Periodic playhead report
    TimeUpdate { time: f64 },
    /// A fragment finished downloading
    FragmentLoaded {
        bytes: u64,
        #[serde(with = "duration_ms")]
        duration: Duration,
    },
    /// The loader switched to another level in automatic mode
    LevelSwitched { level: usize },
    Error(MediaError),
}

impl PlayerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Waiting => "waiting",
            PlayerEvent::Playing => "playing",
            PlayerEvent::CanPlay => "canplay",
            PlayerEvent::Seeking => "seeking",
            PlayerEvent::Seeked => "seeked",
            PlayerEvent::Pause => "pause",
            PlayerEvent::TimeUpdate { .. } => "timeupdate",
            PlayerEvent::FragmentLoaded { .. } => "fragment_loaded",
            PlayerEvent::LevelSwitched { .. } => "level_switched",
            PlayerEvent::Error(_) => "error",
        }
    }
}

/// Serialize durations as integer milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event: PlayerEvent =
            serde_json::from_str(r#"{ "type": "fragment_loaded", "bytes": 500000, "duration": 250 }"#).unwrap();
        assert_eq!(
            event,
            PlayerEvent::FragmentLoaded {
                bytes: 500_000,
                duration: Duration::from_millis(250),
            }
        );

        let event: PlayerEvent = serde_json::from_str(r#"{ "type": "time_update", "time": 12.5 }"#).unwrap();
        assert_eq!(event.name(), "timeupdate");
    }

    #[test]
    fn test_error_event_json_shape() {
        let event: PlayerEvent =
            serde_json::from_str(r#"{ "type": "error", "kind": "decode", "fatal": true, "details": "bufferAppendError" }"#)
                .unwrap();
        assert_eq!(
            event,
            PlayerEvent::Error(MediaError::fatal(MediaErrorKind::Decode, "bufferAppendError"))
        );
    }
}
