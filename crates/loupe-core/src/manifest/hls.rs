//! HLS (HTTP Live Streaming) manifest loader
//!
//! Handles:
//! - Master playlists (one rendition per variant stream)
//! - Media playlists used directly as the entry point (single rendition)

use super::{Manifest, ManifestLoader};
use crate::{error::Error, types::*, Result};
use async_trait::async_trait;
use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// HLS manifest loader
pub struct HlsManifestLoader {
    client: Client,
}

impl HlsManifestLoader {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ManifestLoader for HlsManifestLoader {
    #[instrument(skip(self))]
    async fn load(&self, url: &Url) -> Result<Manifest> {
        debug!("Fetching HLS manifest: {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::ManifestFetch(e.to_string()))?;

        let content = response
            .text()
            .await
            .map_err(|e| Error::ManifestFetch(e.to_string()))?;

        let manifest = parse_manifest(&content, url)?;
        info!(
            renditions = manifest.renditions.len(),
            is_live = manifest.is_live,
            "Manifest parsed"
        );
        Ok(manifest)
    }
}

/// Parse a master or media playlist fetched from `base_url`
pub fn parse_manifest(content: &str, base_url: &Url) -> Result<Manifest> {
    if !content.trim_start().starts_with("#EXTM3U") {
        return Err(Error::ManifestParse("missing #EXTM3U header".into()));
    }

    match m3u8_rs::parse_playlist_res(content.as_bytes()) {
        Ok(Playlist::MasterPlaylist(master)) => parse_master(&master, base_url),
        Ok(Playlist::MediaPlaylist(media)) => Ok(parse_media(&media, base_url)),
        Err(e) => Err(Error::ManifestParse(format!("Failed to parse HLS playlist: {:?}", e))),
    }
}

fn parse_master(master: &MasterPlaylist, base_url: &Url) -> Result<Manifest> {
    let mut renditions = Vec::new();

    for variant in master.variants.iter().filter(|v| !v.is_i_frame) {
        let uri = resolve_uri(base_url, &variant.uri)?;

        let resolution = variant.resolution.as_ref().map(|r| Resolution {
            width: r.width as u32,
            height: r.height as u32,
        });

        renditions.push(Rendition {
            index: 0,
            bitrate: (variant.bandwidth > 0).then_some(variant.bandwidth),
            resolution,
            uri,
            codecs: variant.codecs.clone(),
        });
    }

    if renditions.is_empty() {
        return Err(Error::InvalidManifest("master playlist has no variant streams".into()));
    }

    // Ascending quality; indices are assigned after sorting
    renditions.sort_by_key(|r| (r.bitrate_or_zero(), r.height().unwrap_or(0)));

    Ok(Manifest::new(base_url.clone(), renditions))
}

fn parse_media(media: &MediaPlaylist, base_url: &Url) -> Manifest {
    let duration = media.end_list.then(|| {
        Duration::from_secs_f64(media.segments.iter().map(|s| s.duration as f64).sum())
    });

    // Single rendition: the media playlist itself
    let rendition = Rendition {
        index: 0,
        bitrate: None,
        resolution: None,
        uri: base_url.clone(),
        codecs: None,
    };

    Manifest {
        is_live: !media.end_list,
        duration,
        ..Manifest::new(base_url.clone(), vec![rendition])
    }
}

/// Resolve relative URI against base URL
fn resolve_uri(base: &Url, relative: &str) -> Result<Url> {
    base.join(relative)
        .map_err(|e| Error::InvalidManifest(format!("Invalid URI '{}': {}", relative, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720,CODECS=\"avc1.4d401f,mp4a.40.2\"
720p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=400000,RESOLUTION=426x240
240p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1400000,RESOLUTION=854x480
480p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
https://other.example.com/360p/index.m3u8
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=90000,RESOLUTION=640x360,URI=\"iframes.m3u8\"
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:6.0,
seg0.ts
#EXTINF:6.0,
seg1.ts
#EXTINF:4.5,
seg2.ts
#EXT-X-ENDLIST
";

    fn base() -> Url {
        Url::parse("https://cdn.example.com/videos/abc/master.m3u8").unwrap()
    }

    #[test]
    fn test_master_sorted_and_indexed() {
        let manifest = parse_manifest(MASTER, &base()).unwrap();

        let heights: Vec<_> = manifest.renditions.iter().map(|r| r.height()).collect();
        assert_eq!(heights, vec![Some(240), Some(360), Some(480), Some(720)]);
        for (i, r) in manifest.renditions.iter().enumerate() {
            assert_eq!(r.index, i);
        }
        assert!(!manifest.is_live);
    }

    #[test]
    fn test_master_resolves_uris() {
        let manifest = parse_manifest(MASTER, &base()).unwrap();

        assert_eq!(
            manifest.renditions[0].uri.as_str(),
            "https://cdn.example.com/videos/abc/240p/index.m3u8"
        );
        assert_eq!(
            manifest.renditions[1].uri.as_str(),
            "https://other.example.com/360p/index.m3u8"
        );
        assert_eq!(manifest.renditions[3].codecs.as_deref(), Some("avc1.4d401f,mp4a.40.2"));
    }

    #[test]
    fn test_media_playlist_entry_point() {
        let manifest = parse_manifest(MEDIA, &base()).unwrap();

        assert_eq!(manifest.renditions.len(), 1);
        assert_eq!(manifest.renditions[0].uri, base());
        assert_eq!(manifest.renditions[0].height(), None);
        assert!(!manifest.is_live);
        assert_eq!(manifest.duration, Some(Duration::from_secs_f64(16.5)));
    }

    #[test]
    fn test_rejects_non_playlist() {
        let result = parse_manifest("<html>not found</html>", &base());
        assert!(matches!(result, Err(Error::ManifestParse(_))));
    }
}
