//! Manifest loading
//!
//! A manifest is loaded once per session, before any rendition selection.
//! The result is the ordered rendition list plus the addressing the
//! fragment loader needs to start retrieving fragments.

#[cfg(feature = "hls")]
mod hls;

#[cfg(feature = "hls")]
pub use hls::{parse_manifest, HlsManifestLoader};

use crate::{Rendition, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Parsed manifest data
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Address the manifest was loaded from
    pub source: Url,
    /// Renditions in ascending quality order; never mutated after load
    pub renditions: Arc<[Rendition]>,
    /// Is this a live stream
    pub is_live: bool,
    /// Total duration (for VOD media playlists)
    pub duration: Option<Duration>,
}

impl Manifest {
    /// Build a manifest, assigning rendition indices from list order
    pub fn new(source: Url, renditions: Vec<Rendition>) -> Self {
        let renditions: Vec<Rendition> = renditions
            .into_iter()
            .enumerate()
            .map(|(index, r)| Rendition { index, ..r })
            .collect();
        Self {
            source,
            renditions: renditions.into(),
            is_live: false,
            duration: None,
        }
    }

    pub fn rendition(&self, index: usize) -> Option<&Rendition> {
        self.renditions.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.renditions.is_empty()
    }
}

/// Trait for manifest loaders
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    /// Fetch and parse the manifest at `url`
    async fn load(&self, url: &Url) -> Result<Manifest>;
}
