//! Buffer target management
//!
//! Handles:
//! - Platform/viewport scaled buffer profiles
//! - Fast-start targets for quick first frame
//! - One-way widening to steady-state targets once playback is stable

use crate::config::{BufferProfile, ControllerConfig};
use crate::types::{BufferTargets, HostEnvironment};
use tracing::{debug, info};

/// Buffer manager for one session
#[derive(Debug, Clone)]
pub struct BufferManager {
    /// Targets currently applied to the loader
    targets: BufferTargets,
    /// Targets once playback has warmed up
    steady: BufferTargets,
    widened: bool,
}

impl BufferManager {
    /// Create a buffer manager scaled for the host platform
    pub fn new(config: &ControllerConfig, host: &HostEnvironment) -> Self {
        let profile: BufferProfile = if host.low_power_engine {
            config.low_power_buffer
        } else {
            config.desktop_buffer
        };

        let mut targets = BufferTargets::new(
            profile.fast_start_secs,
            profile.max_secs,
            profile.back_secs.min(profile.fast_start_secs),
        );
        let mut steady = BufferTargets::new(profile.steady_secs, profile.max_secs, profile.back_secs);
        if host.is_mobile_viewport(config.mobile_max_width) {
            targets = targets.scaled(config.mobile_buffer_scale);
            steady = steady.scaled(config.mobile_buffer_scale);
        }

        debug!(
            low_power = host.low_power_engine,
            viewport_width = host.viewport_width,
            ?targets,
            ?steady,
            "Buffer targets configured"
        );

        Self {
            targets,
            steady,
            widened: false,
        }
    }

    pub fn targets(&self) -> BufferTargets {
        self.targets
    }

    pub fn steady_targets(&self) -> BufferTargets {
        self.steady
    }

    pub fn is_widened(&self) -> bool {
        self.widened
    }

    /// Widen to steady-state targets. Happens at most once per session;
    /// returns the new targets when they changed.
    pub fn widen(&mut self) -> Option<BufferTargets> {
        if self.widened {
            return None;
        }
        self.widened = true;
        let widened = self.targets.ratchet(&self.steady);
        if widened == self.targets {
            return None;
        }
        info!(
            forward = widened.forward_secs,
            max_forward = widened.max_forward_secs,
            back = widened.back_secs,
            "Buffer targets widened"
        );
        self.targets = widened;
        Some(widened)
    }
}
