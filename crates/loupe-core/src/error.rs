//! Error types for Loupe Core

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    // Manifest errors
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("Invalid manifest format: {0}")]
    InvalidManifest(String),

    // Errors reported by the playback collaborators
    #[error("Fragment loading failed: {0}")]
    FragmentNetwork(String),

    #[error("Media decode failed: {0}")]
    MediaDecode(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    // Lifecycle errors
    #[error("Session already destroyed")]
    SessionDestroyed,

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration is not valid JSON: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ManifestFetch(_) | Error::FragmentNetwork(_) | Error::MediaDecode(_) | Error::Network(_)
        )
    }

    /// Returns true for the manifest family of errors
    pub fn is_manifest_error(&self) -> bool {
        matches!(
            self,
            Error::ManifestFetch(_) | Error::ManifestParse(_) | Error::InvalidManifest(_)
        )
    }

    /// Message shown to the viewer next to the retry action
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::ManifestFetch(_) | Error::Network(_) | Error::FragmentNetwork(_) => {
                "The video could not be loaded. Check your connection and try again."
            }
            Error::ManifestParse(_) | Error::InvalidManifest(_) => "This video is currently unavailable.",
            Error::MediaDecode(_) => "This video could not be played on this device.",
            _ => "Something went wrong during playback.",
        }
    }

    /// Returns the error code for session events
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::InvalidManifest(_) => "INVALID_MANIFEST",
            Error::FragmentNetwork(_) => "FRAGMENT_NETWORK",
            Error::MediaDecode(_) => "MEDIA_DECODE",
            Error::Playback(_) => "PLAYBACK",
            Error::SessionDestroyed => "DESTROYED",
            Error::Network(_) => "NETWORK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::ConfigFormat(_) => "CONFIG_FORMAT",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_family() {
        assert!(Error::ManifestFetch("timeout".into()).is_manifest_error());
        assert!(Error::InvalidManifest("empty".into()).is_manifest_error());
        assert!(!Error::MediaDecode("bad frame".into()).is_manifest_error());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::ManifestParse("x".into()).error_code(), "MANIFEST_PARSE");
        assert_eq!(Error::SessionDestroyed.error_code(), "DESTROYED");
        assert!(Error::FragmentNetwork("503".into()).is_recoverable());
        assert!(!Error::Playback("boom".into()).is_recoverable());
    }
}
