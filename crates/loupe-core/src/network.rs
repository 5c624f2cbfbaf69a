//! Network condition estimation
//!
//! Two signals feed rendition selection:
//! - a coarse [`NetworkClass`] from the environment's connection hint and
//!   the viewport, used for the initial pick
//! - a throughput estimate from fragment download timing, used by the
//!   continuous ABR

use crate::types::NetworkClass;
use std::time::Duration;
use tracing::debug;

/// Source of the environment's coarse connection hint.
///
/// Mirrors the browser network-information `effectiveType` values
/// (`slow-2g`, `2g`, `3g`, `4g`). Absence is not an error.
pub trait EnvironmentSignal: Send {
    fn effective_type(&self) -> Option<String>;
}

/// Fixed signal, used when the host reads it once up front
#[derive(Debug, Clone, Default)]
pub struct StaticSignal(pub Option<String>);

impl StaticSignal {
    pub fn new(effective_type: impl Into<String>) -> Self {
        Self(Some(effective_type.into()))
    }

    pub fn absent() -> Self {
        Self(None)
    }
}

impl EnvironmentSignal for StaticSignal {
    fn effective_type(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Classify the connection from the environment hint and viewport width
pub fn classify(effective_type: Option<&str>, viewport_width: u32, mobile_max_width: u32) -> NetworkClass {
    let mobile = viewport_width <= mobile_max_width;
    let class = match effective_type.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
        Some("slow-2g") | Some("2g") => NetworkClass::VerySlow,
        Some("3g") if mobile => NetworkClass::MobileModerate,
        Some("3g") => NetworkClass::Slow,
        Some("4g") if mobile => NetworkClass::MobileFast,
        Some("4g") => NetworkClass::Fast,
        _ => NetworkClass::Unknown,
    };
    debug!(?effective_type, viewport_width, %class, "Network classified");
    class
}

/// Fragment throughput sample
#[derive(Debug, Clone, Copy)]
pub struct BandwidthMeasurement {
    /// Bytes downloaded
    pub bytes: u64,
    /// Time taken
    pub duration: Duration,
}

impl BandwidthMeasurement {
    /// Calculate throughput in bits per second
    pub fn throughput_bps(&self) -> u64 {
        if self.duration.as_secs_f64() > 0.0 {
            ((self.bytes as f64 * 8.0) / self.duration.as_secs_f64()) as u64
        } else {
            0
        }
    }
}

/// EWMA throughput estimator
#[derive(Debug, Clone)]
pub struct ThroughputEstimator {
    alpha: f64,
    estimate_bps: u64,
    samples: u64,
}

impl ThroughputEstimator {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            estimate_bps: 0,
            samples: 0,
        }
    }

    /// Record a fragment download; zero-duration samples are ignored
    pub fn record(&mut self, measurement: BandwidthMeasurement) -> Option<u64> {
        if measurement.duration.is_zero() {
            return None;
        }
        let sample = measurement.throughput_bps();
        if self.samples == 0 {
            self.estimate_bps = sample;
        } else {
            self.estimate_bps =
                ((self.estimate_bps as f64 * (1.0 - self.alpha)) + (sample as f64 * self.alpha)) as u64;
        }
        self.samples += 1;

        debug!(
            bytes = measurement.bytes,
            duration_ms = measurement.duration.as_millis() as u64,
            throughput_mbps = sample as f64 / 1_000_000.0,
            estimate_mbps = self.estimate_bps as f64 / 1_000_000.0,
            "Bandwidth measurement recorded"
        );
        Some(self.estimate_bps)
    }

    /// Current estimate, if any sample was recorded
    pub fn estimate_bps(&self) -> Option<u64> {
        (self.samples > 0).then_some(self.estimate_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_signals() {
        assert_eq!(classify(Some("slow-2g"), 1920, 768), NetworkClass::VerySlow);
        assert_eq!(classify(Some("2g"), 390, 768), NetworkClass::VerySlow);
        assert_eq!(classify(Some("3g"), 390, 768), NetworkClass::MobileModerate);
        assert_eq!(classify(Some("3g"), 1920, 768), NetworkClass::Slow);
        assert_eq!(classify(Some("4g"), 390, 768), NetworkClass::MobileFast);
        assert_eq!(classify(Some("4G "), 1440, 768), NetworkClass::Fast);
    }

    #[test]
    fn test_missing_signal_is_unknown() {
        assert_eq!(classify(None, 390, 768), NetworkClass::Unknown);
        assert_eq!(classify(Some("wifi"), 1280, 768), NetworkClass::Unknown);
        assert_eq!(StaticSignal::absent().effective_type(), None);
    }

    #[test]
    fn test_ewma_estimate() {
        let mut estimator = ThroughputEstimator::new(0.2);
        assert_eq!(estimator.estimate_bps(), None);

        // 1 MB in 1 s = 8 Mbps
        estimator.record(BandwidthMeasurement {
            bytes: 1_000_000,
            duration: Duration::from_secs(1),
        });
        assert_eq!(estimator.estimate_bps(), Some(8_000_000));

        // 3 Mbps sample pulls the estimate down by a fifth of the gap
        estimator.record(BandwidthMeasurement {
            bytes: 375_000,
            duration: Duration::from_secs(1),
        });
        assert_eq!(estimator.estimate_bps(), Some(7_000_000));
    }

    #[test]
    fn test_zero_duration_ignored() {
        let mut estimator = ThroughputEstimator::new(0.2);
        let result = estimator.record(BandwidthMeasurement {
            bytes: 10_000,
            duration: Duration::ZERO,
        });
        assert_eq!(result, None);
        assert_eq!(estimator.estimate_bps(), None);
    }
}
