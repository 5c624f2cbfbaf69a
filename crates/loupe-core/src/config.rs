//! Controller configuration
//!
//! Every threshold the controller uses lives here. The defaults are the
//! observed production values; all of them are tunable policy.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Buffer target profile for one platform class (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferProfile {
    /// Forward target used until playback has warmed up
    pub fast_start_secs: f64,
    /// Forward target once playback is stable
    pub steady_secs: f64,
    /// Max forward buffer
    pub max_secs: f64,
    /// Back-buffer retention
    pub back_secs: f64,
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Viewports at most this wide are treated as mobile
    pub mobile_max_width: u32,

    // Rendition selection
    /// EWMA weight of the newest throughput sample
    pub ewma_alpha: f64,
    /// Throughput fraction a higher rendition must fit into
    pub abr_up_factor: f64,
    /// Throughput fraction the current or a lower rendition must fit into
    pub abr_down_factor: f64,
    /// Height cap on low-power rendering engines
    pub low_power_max_height: u32,
    /// Stall count a downgrade needs to exceed
    pub downgrade_min_stalls: u32,
    /// Auto-selection re-enable delay for the mobile-moderate initial pick
    pub moderate_restore_ms: u64,
    /// Auto-selection re-enable delay after a stall or seek pin
    pub restore_after_stall_ms: u64,
    /// Shortened re-enable delay once the primitive reports it can play
    pub restore_after_canplay_ms: u64,

    // Stall detection
    /// Waiting watchdog on desktop
    pub stall_watchdog_ms: u64,
    /// Waiting watchdog on constrained platforms
    pub stall_watchdog_constrained_ms: u64,
    /// Healthy playback needed before the stall count resets
    pub stall_reset_window_ms: u64,
    /// Micro-seek offset applied to skip a decoder gap
    pub nudge_offset_secs: f64,
    /// Frozen-frame poll period
    pub frozen_poll_interval_ms: u64,
    /// How long into a playing segment the frozen-frame poll runs
    pub frozen_watch_window_ms: u64,
    /// Minimum playhead advance between polls
    pub frozen_epsilon_secs: f64,

    // Seeking
    /// Backward seeks longer than this cap quality
    pub large_seek_threshold_secs: f64,
    /// Stable scrub position required before loading resumes
    pub seek_debounce_ms: u64,

    // Buffering
    /// Playing time required before buffer targets widen
    pub buffer_warmup_ms: u64,
    pub desktop_buffer: BufferProfile,
    pub low_power_buffer: BufferProfile,
    /// Factor applied to the profile on a mobile viewport
    pub mobile_buffer_scale: f64,

    // Error recovery
    /// Silent retries of a fatal manifest error
    pub manifest_retries: u32,
    /// Restarts after a fatal network error
    pub network_retries: u32,
    /// Media error recoveries after a fatal decode error
    pub decode_recoveries: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mobile_max_width: 768,

            ewma_alpha: 0.2,
            abr_up_factor: 0.7,
            abr_down_factor: 0.9,
            low_power_max_height: 720,
            downgrade_min_stalls: 1,
            moderate_restore_ms: 10_000,
            restore_after_stall_ms: 8_000,
            restore_after_canplay_ms: 3_000,

            stall_watchdog_ms: 4_000,
            stall_watchdog_constrained_ms: 2_000,
            stall_reset_window_ms: 10_000,
            nudge_offset_secs: 0.05,
            frozen_poll_interval_ms: 2_000,
            frozen_watch_window_ms: 30_000,
            frozen_epsilon_secs: 0.1,

            large_seek_threshold_secs: 8.0,
            seek_debounce_ms: 250,

            buffer_warmup_ms: 3_000,
            desktop_buffer: BufferProfile {
                fast_start_secs: 8.0,
                steady_secs: 30.0,
                max_secs: 60.0,
                back_secs: 30.0,
            },
            low_power_buffer: BufferProfile {
                fast_start_secs: 4.0,
                steady_secs: 15.0,
                max_secs: 30.0,
                back_secs: 10.0,
            },
            mobile_buffer_scale: 0.6,

            manifest_retries: 1,
            network_retries: 1,
            decode_recoveries: 1,
        }
    }
}

impl ControllerConfig {
    /// Parse a (possibly partial) JSON config; missing keys take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ControllerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Reject values that would break the controller's invariants
    pub fn validate(&self) -> Result<()> {
        for (name, factor) in [
            ("abr_up_factor", self.abr_up_factor),
            ("abr_down_factor", self.abr_down_factor),
        ] {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(Error::InvalidConfig(format!("{name} must be in (0, 1], got {factor}")));
            }
        }
        if self.abr_up_factor > self.abr_down_factor {
            return Err(Error::InvalidConfig(
                "abr_up_factor must not exceed abr_down_factor".into(),
            ));
        }
        if !(self.ewma_alpha > 0.0 && self.ewma_alpha <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "ewma_alpha must be in (0, 1], got {}",
                self.ewma_alpha
            )));
        }
        if !(self.mobile_buffer_scale > 0.0 && self.mobile_buffer_scale <= 1.0) {
            return Err(Error::InvalidConfig(
                "mobile_buffer_scale must be in (0, 1]".into(),
            ));
        }
        for (name, profile) in [
            ("desktop_buffer", &self.desktop_buffer),
            ("low_power_buffer", &self.low_power_buffer),
        ] {
            if profile.fast_start_secs > profile.steady_secs || profile.steady_secs > profile.max_secs {
                return Err(Error::InvalidConfig(format!(
                    "{name} must satisfy fast_start <= steady <= max"
                )));
            }
        }
        // Self-re-arming timers need a non-zero period
        for (name, ms) in [
            ("stall_watchdog_ms", self.stall_watchdog_ms),
            ("stall_watchdog_constrained_ms", self.stall_watchdog_constrained_ms),
            ("frozen_poll_interval_ms", self.frozen_poll_interval_ms),
        ] {
            if ms == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.large_seek_threshold_secs <= 0.0 {
            return Err(Error::InvalidConfig(
                "large_seek_threshold_secs must be positive".into(),
            ));
        }
        if self.restore_after_canplay_ms > self.restore_after_stall_ms {
            return Err(Error::InvalidConfig(
                "restore_after_canplay_ms must not exceed restore_after_stall_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn stall_watchdog(&self, constrained: bool) -> Duration {
        if constrained {
            Duration::from_millis(self.stall_watchdog_constrained_ms)
        } else {
            Duration::from_millis(self.stall_watchdog_ms)
        }
    }

    pub fn stall_reset_window(&self) -> Duration {
        Duration::from_millis(self.stall_reset_window_ms)
    }

    pub fn frozen_poll_interval(&self) -> Duration {
        Duration::from_millis(self.frozen_poll_interval_ms)
    }

    pub fn frozen_watch_window(&self) -> Duration {
        Duration::from_millis(self.frozen_watch_window_ms)
    }

    pub fn seek_debounce(&self) -> Duration {
        Duration::from_millis(self.seek_debounce_ms)
    }

    pub fn buffer_warmup(&self) -> Duration {
        Duration::from_millis(self.buffer_warmup_ms)
    }

    pub fn moderate_restore(&self) -> Duration {
        Duration::from_millis(self.moderate_restore_ms)
    }

    pub fn restore_after_stall(&self) -> Duration {
        Duration::from_millis(self.restore_after_stall_ms)
    }

    pub fn restore_after_canplay(&self) -> Duration {
        Duration::from_millis(self.restore_after_canplay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.large_seek_threshold_secs, 8.0);
        assert_eq!(config.stall_reset_window(), Duration::from_secs(10));
        assert_eq!(config.seek_debounce(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = ControllerConfig::from_json_str(r#"{ "large_seek_threshold_secs": 12.5 }"#).unwrap();
        assert_eq!(config.large_seek_threshold_secs, 12.5);
        assert_eq!(config.stall_watchdog_ms, 4_000);
    }

    #[test]
    fn test_rejects_inverted_factors() {
        let result = ControllerConfig::from_json_str(r#"{ "abr_up_factor": 0.95, "abr_down_factor": 0.8 }"#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let result = ControllerConfig::from_json_str("{ nope");
        assert!(matches!(result, Err(Error::ConfigFormat(_))));
    }

    #[test]
    fn test_watchdog_shorter_when_constrained() {
        let config = ControllerConfig::default();
        assert!(config.stall_watchdog(true) < config.stall_watchdog(false));
    }
}
