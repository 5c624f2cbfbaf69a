//! Loupe Core - Adaptive streaming playback controller
//!
//! This crate decides how a segmented stream is played on a given device:
//! - HLS master playlist parsing into an ordered rendition ladder
//! - Network classification and a conservative throughput ABR
//! - Buffer targets scaled to the platform, widened once playback is stable
//! - Stall detection and recovery, including frozen-frame detection
//! - Seek handling with loader pausing and quality caps
//! - A playback state machine projected onto one host-visible status
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Loupe Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Manifest   │  │   Network    │  │  Rendition   │           │
//! │  │    Loader    │  │  Estimator   │  │   Selector   │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │    Buffer    │──│  Playback   │──│    Stall     │            │
//! │  │   Manager    │  │   Session   │  │   Detector   │            │
//! │  └──────────────┘  └──────┬──────┘  └──────────────┘            │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │     Seek     │  │   Player    │  │    Event     │            │
//! │  │  Controller  │  │   Driver    │  │   Emitter    │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The media element and the fragment loader are host collaborators behind
//! the [`PlaybackPrimitive`] and [`FragmentLoader`] traits.

pub mod abr;
pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod manifest;
pub mod network;
pub mod player;
pub mod primitive;
pub mod seek;
pub mod session;
pub mod sim;
pub mod stall;
pub mod state;
pub mod timer;
pub mod types;

pub use abr::{RenditionSelector, RestoreReason};
pub use buffer::BufferManager;
pub use config::{BufferProfile, ControllerConfig};
pub use error::{Error, Result};
pub use events::{EventRecord, SessionEvent};
pub use manifest::{Manifest, ManifestLoader};
#[cfg(feature = "hls")]
pub use manifest::{parse_manifest, HlsManifestLoader};
pub use network::{classify, EnvironmentSignal, StaticSignal};
pub use player::PlayerHandle;
pub use primitive::{FragmentLoader, MediaError, MediaErrorKind, PlaybackPrimitive, PlayerEvent};
pub use session::PlaybackSession;
pub use state::PlaybackState;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library; logs the version
pub fn init() {
    tracing::info!(version = VERSION, "Loupe Core initialized");
}
