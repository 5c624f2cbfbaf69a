//! Core types for Loupe

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns quality tier name
    pub fn quality_name(&self) -> &'static str {
        match self.height {
            0..=240 => "240p",
            241..=360 => "360p",
            361..=480 => "480p",
            481..=720 => "720p",
            721..=1080 => "1080p",
            1081..=1440 => "1440p",
            _ => "4K",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One encoded quality variant of the media.
///
/// Renditions are immutable once the manifest is parsed. `index` is the
/// position in the manifest's ordered (ascending quality) list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rendition {
    /// Position in the ordered rendition list
    pub index: usize,
    /// Peak bitrate in bits per second, if advertised
    pub bitrate: Option<u64>,
    /// Video resolution, if advertised
    pub resolution: Option<Resolution>,
    /// Variant playlist address
    pub uri: Url,
    /// Codec string as advertised by the manifest
    pub codecs: Option<String>,
}

impl Rendition {
    /// Height in pixels, if known
    pub fn height(&self) -> Option<u32> {
        self.resolution.map(|r| r.height)
    }

    /// Bitrate treating an unknown value as zero
    pub fn bitrate_or_zero(&self) -> u64 {
        self.bitrate.unwrap_or(0)
    }

    /// Short human label such as `720p` or `#2`
    pub fn label(&self) -> String {
        match self.resolution {
            Some(r) => r.quality_name().to_string(),
            None => format!("#{}", self.index),
        }
    }
}

/// Level selection as written to the fragment loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelSelection {
    /// Automatic selection is enabled
    Auto,
    /// A specific rendition is pinned
    Pinned(usize),
}

impl LevelSelection {
    /// Loader-style level index: `-1` for automatic selection
    pub fn as_index(&self) -> i64 {
        match self {
            LevelSelection::Auto => -1,
            LevelSelection::Pinned(index) => *index as i64,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, LevelSelection::Auto)
    }
}

/// Forward, max-forward and back-buffer targets in seconds.
///
/// Always satisfies `back <= forward <= max_forward`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferTargets {
    /// Seconds of media to keep buffered ahead of the playhead
    pub forward_secs: f64,
    /// Upper bound the loader may buffer ahead
    pub max_forward_secs: f64,
    /// Seconds of already played media to retain
    pub back_secs: f64,
}

impl BufferTargets {
    /// Build targets, clamping into `back <= forward <= max_forward`
    pub fn new(forward_secs: f64, max_forward_secs: f64, back_secs: f64) -> Self {
        let max_forward_secs = max_forward_secs.max(0.0);
        let forward_secs = forward_secs.clamp(0.0, max_forward_secs);
        let back_secs = back_secs.clamp(0.0, forward_secs);
        Self {
            forward_secs,
            max_forward_secs,
            back_secs,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.back_secs <= self.forward_secs && self.forward_secs <= self.max_forward_secs
    }

    /// Component-wise maximum; never shrinks any target
    pub fn ratchet(&self, other: &BufferTargets) -> BufferTargets {
        BufferTargets::new(
            self.forward_secs.max(other.forward_secs),
            self.max_forward_secs.max(other.max_forward_secs),
            self.back_secs.max(other.back_secs),
        )
    }

    /// Scale every target by `factor`
    pub fn scaled(&self, factor: f64) -> BufferTargets {
        BufferTargets::new(
            self.forward_secs * factor,
            self.max_forward_secs * factor,
            self.back_secs * factor,
        )
    }
}

/// Coarse network classification used for the initial pick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkClass {
    VerySlow,
    Slow,
    MobileModerate,
    MobileFast,
    Fast,
    Unknown,
}

impl std::fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkClass::VerySlow => write!(f, "very-slow"),
            NetworkClass::Slow => write!(f, "slow"),
            NetworkClass::MobileModerate => write!(f, "mobile-moderate"),
            NetworkClass::MobileFast => write!(f, "mobile-fast"),
            NetworkClass::Fast => write!(f, "fast"),
            NetworkClass::Unknown => write!(f, "unknown"),
        }
    }
}

/// What the host page knows about the platform it runs on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostEnvironment {
    /// Viewport width in CSS pixels
    pub viewport_width: u32,
    /// Viewport height in CSS pixels
    pub viewport_height: u32,
    /// Low-power mobile rendering engine detected
    pub low_power_engine: bool,
    /// The platform plays the media format natively
    pub native_playback: bool,
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 720,
            low_power_engine: false,
            native_playback: false,
        }
    }
}

impl HostEnvironment {
    /// Viewport classified as mobile
    pub fn is_mobile_viewport(&self, mobile_max_width: u32) -> bool {
        self.viewport_width <= mobile_max_width
    }

    /// Mobile viewport or low-power engine
    pub fn is_constrained(&self, mobile_max_width: u32) -> bool {
        self.low_power_engine || self.is_mobile_viewport(mobile_max_width)
    }
}

/// Parameters the host page constructs a player with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Manifest address
    pub source: Url,
    /// Poster image shown before the first frame
    pub poster: Option<Url>,
    /// Autoplay requested (advisory; suppressed on mobile viewports)
    pub autoplay: bool,
    /// Start muted
    pub muted: bool,
}

impl SessionOptions {
    pub fn new(source: Url) -> Self {
        Self {
            source,
            poster: None,
            autoplay: false,
            muted: false,
        }
    }

    pub fn with_poster(mut self, poster: Url) -> Self {
        self.poster = Some(poster);
        self
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }
}

/// How a stall was noticed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallSource {
    /// The primitive reported waiting and did not resume in time
    Watchdog,
    /// The playhead stopped advancing while reported as playing
    FrozenFrame,
}

/// Recovery step taken for a stall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Nudge,
    Downgrade,
    Reload,
}

/// A detected stall and what was done about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StallEvent {
    /// Session clock at detection
    pub detected_at: Duration,
    /// Stall count after this stall
    pub stall_count: u32,
    pub source: StallSource,
    pub actions: Vec<RecoveryAction>,
}

/// A seek observed on the primitive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeekEvent {
    pub from_time: f64,
    pub to_time: f64,
    pub delta: f64,
    /// `delta` below the negative large-seek threshold
    pub large_backward: bool,
}

/// Why a rendition was pinned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinReason {
    InitialNetwork,
    Stall,
    Seek,
}

/// The single status the host UI renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// Show the buffering spinner
    Buffering,
    /// Show nothing
    Ready,
    /// Show the error panel with a retry action
    Error { message: String },
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Buffering => write!(f, "buffering"),
            PlaybackStatus::Ready => write!(f, "ready"),
            PlaybackStatus::Error { message } => write!(f, "error({})", message),
        }
    }
}
