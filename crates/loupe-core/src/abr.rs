//! Rendition selection (ABR controller)
//!
//! The selector owns the active rendition and the auto-selection flag and is
//! the only code that writes level fields on the fragment loader. It
//! combines:
//! - an initial pick driven by the coarse network class
//! - a conservative throughput ABR while auto-selection is enabled
//! - manual caps requested by stall recovery and the seek controller
//!
//! Caps are last-writer-wins. A single pending-restore reason tracks which
//! trigger owns the restore slot; the session arms the matching timer.

use crate::config::ControllerConfig;
use crate::network::{BandwidthMeasurement, ThroughputEstimator};
use crate::primitive::FragmentLoader;
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Lowest height considered watchable after a cap
pub const CONSERVATIVE_MIN_HEIGHT: u32 = 360;

/// Why auto-selection is waiting to be re-enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreReason {
    /// Mobile-moderate initial pick
    InitialNetwork,
    /// Stall-driven downgrade
    Stall,
    /// Large backward seek cap
    Seek,
}

/// Outcome of the initial pick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialPick {
    /// Rendition the session starts on
    pub index: Option<usize>,
    /// Whether auto-selection stays enabled
    pub auto_enabled: bool,
    /// Delay after which auto-selection must be re-enabled
    pub restore_after: Option<Duration>,
}

/// Rendition selector
pub struct RenditionSelector {
    renditions: Arc<[Rendition]>,
    selection: LevelSelection,
    /// Rendition currently in use
    active: Option<usize>,
    /// Very-slow networks keep the initial pin for the whole session
    locked: bool,
    pending_restore: Option<RestoreReason>,
    estimator: ThroughputEstimator,
    up_factor: f64,
    down_factor: f64,
    /// Highest rendition height the throughput ABR may choose
    height_cap: Option<u32>,
    downgrade_min_stalls: u32,
}

impl RenditionSelector {
    pub fn new(renditions: Arc<[Rendition]>, config: &ControllerConfig, host: &HostEnvironment) -> Self {
        let height_cap = height_cap(&renditions, host, config);
        Self {
            active: (!renditions.is_empty()).then_some(0),
            renditions,
            selection: LevelSelection::Auto,
            locked: false,
            pending_restore: None,
            estimator: ThroughputEstimator::new(config.ewma_alpha),
            up_factor: config.abr_up_factor,
            down_factor: config.abr_down_factor,
            height_cap,
            downgrade_min_stalls: config.downgrade_min_stalls,
        }
    }

    /// No renditions: every operation is a no-op
    pub fn is_inert(&self) -> bool {
        self.renditions.is_empty()
    }

    pub fn renditions(&self) -> &[Rendition] {
        &self.renditions
    }

    pub fn selection(&self) -> LevelSelection {
        self.selection
    }

    /// `-1` while automatic selection is enabled, otherwise the pinned index
    pub fn current_rendition_index(&self) -> i64 {
        self.selection.as_index()
    }

    pub fn auto_enabled(&self) -> bool {
        self.selection.is_auto()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_rendition(&self) -> Option<&Rendition> {
        self.active.and_then(|i| self.renditions.get(i))
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn pending_restore(&self) -> Option<RestoreReason> {
        self.pending_restore
    }

    pub fn height_cap(&self) -> Option<u32> {
        self.height_cap
    }

    pub fn bandwidth_estimate(&self) -> Option<u64> {
        self.estimator.estimate_bps()
    }

    /// Choose the starting rendition for `class` and configure the loader
    #[instrument(skip(self, loader))]
    pub fn initial_pick(
        &mut self,
        class: NetworkClass,
        config: &ControllerConfig,
        loader: &mut dyn FragmentLoader,
    ) -> InitialPick {
        if self.is_inert() {
            debug!("No renditions; selector inert");
            return InitialPick {
                index: None,
                auto_enabled: true,
                restore_after: None,
            };
        }

        let pick = match class {
            NetworkClass::VerySlow => {
                let index = self.lowest_at_least(CONSERVATIVE_MIN_HEIGHT);
                self.locked = true;
                self.pin(index, PinReason::InitialNetwork, loader);
                InitialPick {
                    index: Some(index),
                    auto_enabled: false,
                    restore_after: None,
                }
            }
            NetworkClass::MobileModerate => {
                let index = self.highest_in_band(360, 480);
                self.pin(index, PinReason::InitialNetwork, loader);
                self.pending_restore = Some(RestoreReason::InitialNetwork);
                InitialPick {
                    index: Some(index),
                    auto_enabled: false,
                    restore_after: Some(config.moderate_restore()),
                }
            }
            NetworkClass::MobileFast => {
                let index = self.highest_in_band(480, 720);
                self.start_auto_at(index, loader);
                InitialPick {
                    index: Some(index),
                    auto_enabled: true,
                    restore_after: None,
                }
            }
            NetworkClass::Slow | NetworkClass::Fast | NetworkClass::Unknown => {
                let index = self.lowest_eligible();
                self.start_auto_at(index, loader);
                InitialPick {
                    index: Some(index),
                    auto_enabled: true,
                    restore_after: None,
                }
            }
        };

        info!(
            %class,
            index = ?pick.index,
            height = ?pick.index.and_then(|i| self.renditions[i].height()),
            auto = pick.auto_enabled,
            "Initial rendition selected"
        );
        pick
    }

    /// Drop one step below the active rendition after repeated stalls.
    ///
    /// Returns the pinned index, or `None` when the stall count does not
    /// justify a downgrade yet.
    pub fn downgrade_on_stall(&mut self, stall_count: u32, loader: &mut dyn FragmentLoader) -> Option<usize> {
        if self.is_inert() || stall_count <= self.downgrade_min_stalls {
            return None;
        }
        let current = self.active.unwrap_or(0);
        let target = current.saturating_sub(1);
        self.pin(target, PinReason::Stall, loader);
        if !self.locked {
            self.pending_restore = Some(RestoreReason::Stall);
        }
        info!(stall_count, from = current, to = target, "Downgraded after stall");
        Some(target)
    }

    /// Pin a conservative rendition so a far seek target buffers quickly
    pub fn cap_for_seek(&mut self, loader: &mut dyn FragmentLoader) -> Option<usize> {
        if self.is_inert() {
            return None;
        }
        let target = self.lowest_at_least(CONSERVATIVE_MIN_HEIGHT);
        self.pin(target, PinReason::Seek, loader);
        if !self.locked {
            self.pending_restore = Some(RestoreReason::Seek);
        }
        info!(to = target, "Capped quality for seek");
        Some(target)
    }

    /// Re-enable automatic selection. No-op while locked or already automatic.
    pub fn restore(&mut self, loader: &mut dyn FragmentLoader) -> bool {
        self.pending_restore = None;
        if self.is_inert() || self.locked || self.selection.is_auto() {
            return false;
        }
        self.selection = LevelSelection::Auto;
        loader.set_current_level(LevelSelection::Auto.as_index());
        loader.set_auto_level_enabled(true);
        info!(active = ?self.active, "Automatic selection restored");
        true
    }

    /// Feed a fragment download into the estimator and, in automatic mode,
    /// pick the next level. Returns the new active index on a switch.
    pub fn record_fragment(
        &mut self,
        measurement: BandwidthMeasurement,
        loader: &mut dyn FragmentLoader,
    ) -> Option<usize> {
        let estimate = self.estimator.record(measurement)?;
        if self.is_inert() || !self.selection.is_auto() {
            return None;
        }

        let current = self.active.unwrap_or(0);
        let next = self.throughput_pick(estimate, current);
        if next == current {
            return None;
        }

        loader.set_next_auto_level(next);
        self.active = Some(next);
        debug!(from = current, to = next, estimate_bps = estimate, "Automatic level switch");
        Some(next)
    }

    /// The loader reports which level it actually switched to
    pub fn note_level_switched(&mut self, level: usize) {
        if level < self.renditions.len() {
            self.active = Some(level);
        }
    }

    /// Highest eligible rendition whose bitrate fits the scaled estimate.
    ///
    /// Moving up requires the stricter up factor.
    fn throughput_pick(&self, estimate_bps: u64, current: usize) -> usize {
        self.renditions
            .iter()
            .rev()
            .filter(|r| self.is_eligible(r))
            .find(|r| {
                let factor = if r.index > current {
                    self.up_factor
                } else {
                    self.down_factor
                };
                (r.bitrate_or_zero() as f64) <= estimate_bps as f64 * factor
            })
            .map(|r| r.index)
            .unwrap_or_else(|| self.lowest_eligible())
    }

    fn is_eligible(&self, rendition: &Rendition) -> bool {
        match (self.height_cap, rendition.height()) {
            (Some(cap), Some(height)) => height <= cap,
            _ => true,
        }
    }

    fn lowest_eligible(&self) -> usize {
        self.renditions
            .iter()
            .find(|r| self.is_eligible(r))
            .map(|r| r.index)
            .unwrap_or(0)
    }

    /// Lowest rendition at least `min_height` tall, else index 0
    fn lowest_at_least(&self, min_height: u32) -> usize {
        self.renditions
            .iter()
            .filter(|r| r.height().is_some_and(|h| h >= min_height))
            .min_by_key(|r| (r.height().unwrap_or(u32::MAX), r.index))
            .map(|r| r.index)
            .unwrap_or(0)
    }

    /// Highest rendition within `[low, high]`, falling back to the lowest
    /// rendition at least `low` tall
    fn highest_in_band(&self, low: u32, high: u32) -> usize {
        self.renditions
            .iter()
            .filter(|r| r.height().is_some_and(|h| (low..=high).contains(&h)))
            .max_by_key(|r| (r.height().unwrap_or(0), r.index))
            .map(|r| r.index)
            .unwrap_or_else(|| self.lowest_at_least(low))
    }

    fn pin(&mut self, index: usize, reason: PinReason, loader: &mut dyn FragmentLoader) {
        self.selection = LevelSelection::Pinned(index);
        self.active = Some(index);
        loader.set_auto_level_enabled(false);
        loader.set_current_level(index as i64);
        debug!(index, ?reason, "Rendition pinned");
    }

    fn start_auto_at(&mut self, index: usize, loader: &mut dyn FragmentLoader) {
        self.selection = LevelSelection::Auto;
        self.active = Some(index);
        loader.set_auto_level_enabled(true);
        loader.set_current_level(LevelSelection::Auto.as_index());
        loader.set_next_auto_level(index);
    }
}

/// Smallest rendition height covering the viewport, limited further on
/// low-power engines
fn height_cap(renditions: &[Rendition], host: &HostEnvironment, config: &ControllerConfig) -> Option<u32> {
    let viewport_cap = renditions
        .iter()
        .filter_map(|r| r.height())
        .filter(|h| *h >= host.viewport_height)
        .min();
    let device_cap = host.low_power_engine.then_some(config.low_power_max_height);
    match (viewport_cap, device_cap) {
        (Some(v), Some(d)) => Some(v.min(d)),
        (v, d) => v.or(d),
    }
}
