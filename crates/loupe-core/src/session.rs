//! Playback Session - the reactive core of one player instance
//!
//! Coordinates:
//! - Initial rendition pick once the manifest is parsed
//! - Buffer targets and their warm-up widening
//! - Stall detection and recovery
//! - Seek handling
//! - The state machine and the host-visible status
//!
//! The session does no I/O and never reads a clock. Every input carries
//! `now`, the time elapsed since the session was created, and timers are
//! fired by calling [`PlaybackSession::poll_timers`] at or after
//! [`PlaybackSession::next_deadline`].

use crate::{
    abr::{RenditionSelector, RestoreReason},
    buffer::BufferManager,
    config::ControllerConfig,
    events::{EventEmitter, EventRecord, SessionEvent},
    manifest::Manifest,
    network::{classify, BandwidthMeasurement, EnvironmentSignal},
    primitive::{FragmentLoader, MediaError, MediaErrorKind, PlaybackPrimitive, PlayerEvent},
    seek::SeekController,
    stall::{FrozenCheck, StallDetector, WatchdogExpiry},
    state::PlaybackState,
    timer::{TimerKind, Timers},
    types::*,
    Error,
};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

/// Player session managing a single playback
pub struct PlaybackSession {
    /// Unique session ID
    id: SessionId,
    options: SessionOptions,
    config: ControllerConfig,
    host: HostEnvironment,
    signal: Box<dyn EnvironmentSignal>,
    primitive: Box<dyn PlaybackPrimitive>,
    loader: Box<dyn FragmentLoader>,
    /// The platform plays the source itself
    native: bool,
    /// Mobile viewport or low-power engine
    constrained: bool,
    state: PlaybackState,
    error_message: Option<String>,
    status_tx: watch::Sender<PlaybackStatus>,
    events: EventEmitter,
    timers: Timers,
    selector: RenditionSelector,
    buffer: BufferManager,
    stall: StallDetector,
    seek: SeekController,
    network: Option<NetworkClass>,
    manifest_retries: u32,
    network_retries: u32,
    decode_recoveries: u32,
    loader_destroyed: bool,
    /// Latest `now` seen
    last_activity: Duration,
}

impl PlaybackSession {
    /// Create a session bound to one source and one pair of collaborators
    pub fn new(
        options: SessionOptions,
        config: ControllerConfig,
        host: HostEnvironment,
        signal: Box<dyn EnvironmentSignal>,
        primitive: Box<dyn PlaybackPrimitive>,
        loader: Box<dyn FragmentLoader>,
    ) -> Self {
        let id = SessionId::new();
        let (status_tx, _) = watch::channel(PlaybackState::Initializing.status(None));
        let constrained = host.is_constrained(config.mobile_max_width);

        Self {
            id,
            native: host.native_playback,
            constrained,
            state: PlaybackState::Initializing,
            error_message: None,
            status_tx,
            events: EventEmitter::new(id),
            timers: Timers::new(),
            selector: RenditionSelector::new(Vec::<Rendition>::new().into(), &config, &host),
            buffer: BufferManager::new(&config, &host),
            stall: StallDetector::new(
                config.stall_watchdog(constrained),
                config.frozen_watch_window(),
                config.frozen_epsilon_secs,
            ),
            seek: SeekController::new(config.large_seek_threshold_secs),
            network: None,
            manifest_retries: 0,
            network_retries: 0,
            decode_recoveries: 0,
            loader_destroyed: false,
            last_activity: Duration::ZERO,
            options,
            config,
            host,
            signal,
            primitive,
            loader,
        }
    }

    /// Record every emitted event in memory
    pub fn keep_event_history(mut self) -> Self {
        self.events = EventEmitter::new(self.id).with_history();
        self
    }

    /// Get session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// The status the host UI renders
    pub fn status(&self) -> PlaybackStatus {
        self.state.status(self.error_message.as_deref())
    }

    pub fn is_native(&self) -> bool {
        self.native
    }

    pub fn network_class(&self) -> Option<NetworkClass> {
        self.network
    }

    pub fn stall_count(&self) -> u32 {
        self.stall.stall_count()
    }

    pub fn buffer_targets(&self) -> BufferTargets {
        self.buffer.targets()
    }

    pub fn auto_selection_enabled(&self) -> bool {
        self.selector.auto_enabled()
    }

    /// `-1` while automatic selection is enabled
    pub fn current_rendition_index(&self) -> i64 {
        self.selector.current_rendition_index()
    }

    pub fn active_rendition(&self) -> Option<&Rendition> {
        self.selector.active_rendition()
    }

    pub fn renditions(&self) -> &[Rendition] {
        self.selector.renditions()
    }

    pub fn pending_restore(&self) -> Option<RestoreReason> {
        self.selector.pending_restore()
    }

    pub fn last_known_time(&self) -> f64 {
        self.seek.last_known_time()
    }

    pub fn is_timer_armed(&self, kind: TimerKind) -> bool {
        self.timers.is_armed(kind)
    }

    pub fn timer_deadline(&self, kind: TimerKind) -> Option<Duration> {
        self.timers.deadline(kind)
    }

    pub fn armed_timers(&self) -> usize {
        self.timers.armed_count()
    }

    /// Latest session time passed to any input
    pub fn last_activity(&self) -> Duration {
        self.last_activity
    }

    /// Subscribe to status changes; only changes are published
    pub fn subscribe_status(&self) -> watch::Receiver<PlaybackStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// Events recorded when history is enabled
    pub fn event_history(&self) -> &[EventRecord] {
        self.events.history()
    }

    /// Earliest time [`Self::poll_timers`] has work to do
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// Start the session.
    ///
    /// Returns the manifest address the host must load and hand to
    /// [`Self::attach_manifest`], or `None` in native mode where the
    /// source goes straight to the primitive.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn begin_loading(&mut self, now: Duration) -> Option<url::Url> {
        self.touch(now);
        if self.state != PlaybackState::Initializing {
            return None;
        }
        self.transition(PlaybackState::Loading, now);
        self.primitive.set_muted(self.options.muted);

        if self.native {
            info!(source = %self.options.source, "Native playback; attaching source directly");
            self.primitive
                .attach_source(&self.options.source, self.options.poster.as_ref());
            self.maybe_autoplay();
            return None;
        }

        info!(source = %self.options.source, "Loading manifest");
        Some(self.options.source.clone())
    }

    /// Manifest parsed: pick the starting rendition and start loading
    #[instrument(skip(self, manifest), fields(session_id = %self.id))]
    pub fn attach_manifest(&mut self, manifest: Manifest, now: Duration) {
        self.touch(now);
        if self.native || self.state != PlaybackState::Loading {
            debug!(state = %self.state, "Ignoring manifest");
            return;
        }

        self.loader.load_source(&manifest);
        self.selector = RenditionSelector::new(manifest.renditions.clone(), &self.config, &self.host);

        let effective_type = self.signal.effective_type();
        let class = classify(
            effective_type.as_deref(),
            self.host.viewport_width,
            self.config.mobile_max_width,
        );
        self.network = Some(class);

        let pick = self.selector.initial_pick(class, &self.config, self.loader.as_mut());
        if let (Some(index), false) = (pick.index, pick.auto_enabled) {
            self.emit(
                now,
                SessionEvent::RenditionPinned {
                    index,
                    reason: PinReason::InitialNetwork,
                },
            );
        }
        if let Some(delay) = pick.restore_after {
            self.timers.arm(TimerKind::RestoreAuto, now + delay);
        }

        let targets = self.buffer.targets();
        self.loader.set_buffer_targets(&targets);
        self.emit(now, SessionEvent::BufferTargetsChanged(targets));

        self.loader.start_load();

        info!(
            renditions = manifest.renditions.len(),
            is_live = manifest.is_live,
            network = %class,
            "Manifest attached"
        );
        self.emit(
            now,
            SessionEvent::ManifestLoaded {
                renditions: manifest.renditions.len(),
                is_live: manifest.is_live,
                network: class,
                initial_index: pick.index,
                auto_enabled: pick.auto_enabled,
            },
        );

        self.transition(PlaybackState::Ready, now);
        self.maybe_autoplay();
    }

    /// The manifest could not be loaded after the host's retries
    pub fn fail_manifest(&mut self, error: Error, now: Duration) {
        self.touch(now);
        if self.state.is_terminal() {
            return;
        }
        self.fail(error, now);
    }

    /// Feed one primitive or loader event
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn handle_event(&mut self, event: PlayerEvent, now: Duration) {
        self.touch(now);
        if self.state.is_terminal() {
            debug!(event = event.name(), "Ignoring event after teardown");
            return;
        }
        if self.native {
            self.handle_native_event(event, now);
            return;
        }
        if !self.state.is_active() && !matches!(event, PlayerEvent::Error(_)) {
            debug!(event = event.name(), state = %self.state, "Ignoring event before manifest");
            return;
        }

        match event {
            PlayerEvent::Waiting => self.on_waiting(now),
            PlayerEvent::Playing => self.on_playing(now),
            PlayerEvent::CanPlay => self.on_can_play(now),
            PlayerEvent::Seeking => self.on_seeking(now),
            PlayerEvent::Seeked => self.on_seeked(now),
            PlayerEvent::Pause => self.on_pause(now),
            PlayerEvent::TimeUpdate { time } => self.seek.observe_time(time),
            PlayerEvent::FragmentLoaded { bytes, duration } => {
                let measurement = BandwidthMeasurement { bytes, duration };
                if let Some(index) = self.selector.record_fragment(measurement, self.loader.as_mut()) {
                    let estimate_bps = self.selector.bandwidth_estimate();
                    self.emit(now, SessionEvent::AutoLevelSwitched { index, estimate_bps });
                }
            }
            PlayerEvent::LevelSwitched { level } => self.selector.note_level_switched(level),
            PlayerEvent::Error(error) => self.on_media_error(error, now),
        }
    }

    /// Fire every timer due at `now`
    pub fn poll_timers(&mut self, now: Duration) {
        self.touch(now);
        for token in self.timers.due(now) {
            // A handler may have cancelled or re-armed a later token
            if !self.timers.claim(token) {
                continue;
            }
            match token.kind {
                TimerKind::StallWatchdog => self.on_watchdog(now),
                TimerKind::StallCountReset => self.stall.reset_count(),
                TimerKind::SeekDebounce => {
                    debug!("Seek settled; resuming fragment loading");
                    self.loader.start_load();
                }
                TimerKind::RestoreAuto => self.on_restore(now),
                TimerKind::FrozenFramePoll => self.on_frozen_poll(now),
                TimerKind::BufferWarmup => self.on_warmup(now),
            }
        }
    }

    /// Tear the session down. Idempotent; returns the number of timers
    /// cancelled, which is zero on every call after the first.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn destroy(&mut self, now: Duration) -> usize {
        self.touch(now);
        if self.state == PlaybackState::Destroyed {
            return 0;
        }
        let cancelled = self.timers.close();
        if !self.loader_destroyed {
            self.loader.destroy();
            self.loader_destroyed = true;
        }
        self.transition(PlaybackState::Destroyed, now);
        self.emit(
            now,
            SessionEvent::Destroyed {
                timers_cancelled: cancelled,
            },
        );
        info!(timers_cancelled = cancelled, "Session destroyed");
        cancelled
    }

    fn on_waiting(&mut self, now: Duration) {
        if self.seek.is_seeking() {
            // The seek path owns buffering until it settles
            return;
        }
        self.stall.on_waiting();
        self.timers.arm(TimerKind::StallWatchdog, now + self.stall.watchdog());
        self.timers.cancel(TimerKind::StallCountReset);
        self.timers.cancel(TimerKind::BufferWarmup);
        self.timers.cancel(TimerKind::FrozenFramePoll);
        self.transition(PlaybackState::Buffering, now);
    }

    fn on_watchdog(&mut self, now: Duration) {
        let (stall_count, new_stall) = match self.stall.on_watchdog_expired() {
            WatchdogExpiry::Resumed => return,
            WatchdogExpiry::NewStall(count) => (count, true),
            WatchdogExpiry::StillStalled(count) => (count, false),
        };

        let mut actions = Vec::with_capacity(3);
        // Quality only drops once per buffering episode
        let downgraded = if new_stall {
            self.selector.downgrade_on_stall(stall_count, self.loader.as_mut())
        } else {
            None
        };
        if let Some(index) = downgraded {
            actions.push(RecoveryAction::Downgrade);
            self.emit(
                now,
                SessionEvent::RenditionPinned {
                    index,
                    reason: PinReason::Stall,
                },
            );
            self.arm_restore(RestoreReason::Stall, now + self.config.restore_after_stall());
        }

        self.nudge();
        actions.push(RecoveryAction::Nudge);
        self.loader.start_load();
        actions.push(RecoveryAction::Reload);

        self.emit(
            now,
            SessionEvent::Stall(StallEvent {
                detected_at: now,
                stall_count,
                source: StallSource::Watchdog,
                actions,
            }),
        );

        // Keep recovering while the stall persists
        self.timers.arm(TimerKind::StallWatchdog, now + self.stall.watchdog());
    }

    fn on_playing(&mut self, now: Duration) {
        self.on_resumed(now);
        self.transition(PlaybackState::Playing, now);

        if self.constrained && !self.stall.is_watching_frozen() {
            self.stall.start_frozen_watch(now, self.primitive.current_time());
            self.timers
                .arm(TimerKind::FrozenFramePoll, now + self.config.frozen_poll_interval());
        }
        if !self.buffer.is_widened() && !self.timers.is_armed(TimerKind::BufferWarmup) {
            self.timers.arm(TimerKind::BufferWarmup, now + self.config.buffer_warmup());
        }
    }

    fn on_can_play(&mut self, now: Duration) {
        self.on_resumed(now);

        // A recovered stall or seek gets auto-selection back sooner
        if matches!(
            self.selector.pending_restore(),
            Some(RestoreReason::Stall | RestoreReason::Seek)
        ) {
            let sooner = now + self.config.restore_after_canplay();
            if self
                .timers
                .deadline(TimerKind::RestoreAuto)
                .is_some_and(|deadline| deadline > sooner)
            {
                self.timers.arm(TimerKind::RestoreAuto, sooner);
            }
        }

        if matches!(self.state, PlaybackState::Buffering | PlaybackState::Seeking) {
            self.transition(PlaybackState::Ready, now);
        }
    }

    fn on_resumed(&mut self, now: Duration) {
        self.stall.on_resumed();
        self.timers.cancel(TimerKind::StallWatchdog);
        self.timers
            .arm(TimerKind::StallCountReset, now + self.config.stall_reset_window());
    }

    fn on_seeking(&mut self, now: Duration) {
        let target = self.primitive.current_time();
        if self.seek.is_nudge(target) {
            debug!(target, "Internal micro-seek");
            return;
        }

        let event = self.seek.on_seeking(target);
        self.stall.on_seek();
        self.timers.cancel(TimerKind::StallWatchdog);
        self.timers.cancel(TimerKind::BufferWarmup);
        self.timers.cancel(TimerKind::FrozenFramePoll);
        self.loader.stop_load();

        if event.large_backward {
            if let Some(index) = self.selector.cap_for_seek(self.loader.as_mut()) {
                self.emit(
                    now,
                    SessionEvent::RenditionPinned {
                        index,
                        reason: PinReason::Seek,
                    },
                );
                self.arm_restore(RestoreReason::Seek, now + self.config.restore_after_stall());
            }
        }

        self.timers.arm(TimerKind::SeekDebounce, now + self.config.seek_debounce());
        self.emit(now, SessionEvent::Seek(event));
        self.transition(PlaybackState::Seeking, now);
    }

    fn on_seeked(&mut self, now: Duration) {
        let time = self.primitive.current_time();
        if self.seek.is_nudge(time) && self.seek.finish_nudge(time) {
            return;
        }

        self.timers.cancel(TimerKind::SeekDebounce);
        self.loader.start_load();
        self.seek.commit(time);
        debug!(time, "Seek committed");
        if self.state == PlaybackState::Seeking {
            self.transition(PlaybackState::Buffering, now);
        }
    }

    fn on_pause(&mut self, now: Duration) {
        self.timers.cancel(TimerKind::FrozenFramePoll);
        self.timers.cancel(TimerKind::BufferWarmup);
        self.stall.stop_frozen_watch();
        if self.state == PlaybackState::Playing {
            self.transition(PlaybackState::Ready, now);
        }
    }

    fn on_restore(&mut self, now: Duration) {
        if self.selector.restore(self.loader.as_mut()) {
            self.emit(now, SessionEvent::AutoSelectionRestored);
        }
    }

    fn on_frozen_poll(&mut self, now: Duration) {
        let current_time = self.primitive.current_time();
        match self.stall.check_frozen(now, current_time, self.primitive.paused()) {
            FrozenCheck::Advancing => {}
            FrozenCheck::Frozen => {
                self.nudge();
                self.loader.start_load();
                self.emit(
                    now,
                    SessionEvent::Stall(StallEvent {
                        detected_at: now,
                        stall_count: self.stall.stall_count(),
                        source: StallSource::FrozenFrame,
                        actions: vec![RecoveryAction::Nudge, RecoveryAction::Reload],
                    }),
                );
                if !self.stall.frozen_window_open(now) {
                    self.stall.stop_frozen_watch();
                }
            }
            FrozenCheck::Expired | FrozenCheck::Idle => return,
        }
        if self.stall.is_watching_frozen() {
            self.timers
                .arm(TimerKind::FrozenFramePoll, now + self.config.frozen_poll_interval());
        }
    }

    fn on_warmup(&mut self, now: Duration) {
        if let Some(targets) = self.buffer.widen() {
            self.loader.set_buffer_targets(&targets);
            self.emit(now, SessionEvent::BufferTargetsChanged(targets));
        }
    }

    /// Fatal errors get a bounded number of recovery attempts per kind
    fn on_media_error(&mut self, error: MediaError, now: Duration) {
        if !error.fatal {
            warn!(kind = ?error.kind, details = %error.details, "Non-fatal media error");
            return;
        }
        warn!(kind = ?error.kind, details = %error.details, "Fatal media error");

        match error.kind {
            MediaErrorKind::Manifest => {
                if self.manifest_retries < self.config.manifest_retries {
                    self.manifest_retries += 1;
                    self.loader.start_load();
                    self.note_recovery("MANIFEST_FETCH", self.manifest_retries, now);
                } else {
                    self.fail(Error::ManifestFetch(error.details), now);
                }
            }
            MediaErrorKind::Network => {
                if self.network_retries < self.config.network_retries {
                    self.network_retries += 1;
                    self.loader.start_load();
                    self.note_recovery("FRAGMENT_NETWORK", self.network_retries, now);
                } else {
                    self.fail(Error::FragmentNetwork(error.details), now);
                }
            }
            MediaErrorKind::Decode => {
                if self.decode_recoveries < self.config.decode_recoveries {
                    self.decode_recoveries += 1;
                    self.loader.recover_media_error();
                    self.note_recovery("MEDIA_DECODE", self.decode_recoveries, now);
                } else {
                    self.fail(Error::MediaDecode(error.details), now);
                }
            }
            MediaErrorKind::Other => {
                if !self.loader_destroyed {
                    self.loader.destroy();
                    self.loader_destroyed = true;
                }
                self.fail(Error::Playback(error.details), now);
            }
        }
    }

    fn handle_native_event(&mut self, event: PlayerEvent, now: Duration) {
        let target = match event {
            PlayerEvent::Waiting => PlaybackState::Buffering,
            PlayerEvent::Seeking => PlaybackState::Seeking,
            PlayerEvent::Playing => PlaybackState::Playing,
            PlayerEvent::CanPlay | PlayerEvent::Seeked | PlayerEvent::Pause => PlaybackState::Ready,
            PlayerEvent::Error(error) if error.fatal => {
                let error = match error.kind {
                    MediaErrorKind::Manifest => Error::ManifestFetch(error.details),
                    MediaErrorKind::Network => Error::FragmentNetwork(error.details),
                    MediaErrorKind::Decode => Error::MediaDecode(error.details),
                    MediaErrorKind::Other => Error::Playback(error.details),
                };
                self.fail(error, now);
                return;
            }
            PlayerEvent::Error(error) => {
                warn!(kind = ?error.kind, details = %error.details, "Non-fatal media error");
                return;
            }
            _ => return,
        };
        if self.state == PlaybackState::Loading {
            self.transition(PlaybackState::Ready, now);
        }
        self.transition(target, now);
    }

    /// Terminal failure
    fn fail(&mut self, error: Error, now: Duration) {
        let cancelled = self.timers.close();
        warn!(code = error.error_code(), error = %error, timers_cancelled = cancelled, "Playback failed");
        self.error_message = Some(error.user_message().to_string());
        self.emit(
            now,
            SessionEvent::Fatal {
                code: error.error_code().to_string(),
                message: error.to_string(),
            },
        );
        self.transition(PlaybackState::Error, now);
    }

    fn note_recovery(&mut self, code: &str, attempt: u32, now: Duration) {
        info!(code, attempt, "Retrying after fatal media error");
        self.emit(
            now,
            SessionEvent::ErrorRecovery {
                code: code.to_string(),
                attempt,
            },
        );
    }

    /// Micro-seek past a stuck decode position
    fn nudge(&mut self) {
        let target = self.primitive.current_time() + self.config.nudge_offset_secs;
        self.seek.expect_nudge(target);
        self.primitive.set_current_time(target);
    }

    fn arm_restore(&mut self, reason: RestoreReason, deadline: Duration) {
        if self.selector.pending_restore() == Some(reason) {
            self.timers.arm(TimerKind::RestoreAuto, deadline);
        }
    }

    fn maybe_autoplay(&mut self) {
        if !self.options.autoplay {
            return;
        }
        if self.host.is_mobile_viewport(self.config.mobile_max_width) {
            debug!(viewport_width = self.host.viewport_width, "Autoplay suppressed on mobile viewport");
            return;
        }
        self.primitive.play();
    }

    fn transition(&mut self, to: PlaybackState, now: Duration) -> bool {
        let from = self.state;
        if from == to {
            return true;
        }
        if !from.can_transition_to(to) {
            debug!(%from, %to, "Ignoring invalid state transition");
            return false;
        }
        self.state = to;
        debug!(%from, %to, "State transition");
        self.emit(now, SessionEvent::StateChanged { from, to });

        let status = self.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        true
    }

    fn emit(&mut self, now: Duration, event: SessionEvent) {
        self.events.emit(now, event);
    }

    fn touch(&mut self, now: Duration) {
        self.last_activity = self.last_activity.max(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::StaticSignal;
    use crate::sim::{ladder, SimFragmentLoader, SimPlayer};
    use url::Url;

    struct Harness {
        session: PlaybackSession,
        player: SimPlayer,
        loader: SimFragmentLoader,
    }

    fn source() -> Url {
        Url::parse("https://cdn.example.com/vod/master.m3u8").unwrap()
    }

    fn desktop() -> HostEnvironment {
        HostEnvironment {
            viewport_width: 1920,
            viewport_height: 1080,
            ..Default::default()
        }
    }

    fn harness(host: HostEnvironment, effective_type: Option<&str>, heights: &[u32]) -> Harness {
        let player = SimPlayer::new();
        let loader = SimFragmentLoader::new(Vec::new());
        let signal = match effective_type {
            Some(kind) => StaticSignal::new(kind),
            None => StaticSignal::absent(),
        };
        let mut session = PlaybackSession::new(
            SessionOptions::new(source()),
            ControllerConfig::default(),
            host,
            Box::new(signal),
            Box::new(player.clone()),
            Box::new(loader.clone()),
        );
        if let Some(url) = session.begin_loading(Duration::ZERO) {
            let manifest = Manifest::new(url.clone(), ladder(&url, heights));
            session.attach_manifest(manifest, Duration::ZERO);
        }
        Harness {
            session,
            player,
            loader,
        }
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_attach_configures_loader() {
        let h = harness(desktop(), Some("4g"), &[360, 720, 1080]);
        let snapshot = h.loader.snapshot();

        assert_eq!(h.session.state(), PlaybackState::Ready);
        assert_eq!(h.session.network_class(), Some(NetworkClass::Fast));
        assert_eq!(snapshot.source, Some(source()));
        assert_eq!(snapshot.start_loads, 1);
        assert_eq!(snapshot.buffer_targets.len(), 1);
        assert!(h.session.auto_selection_enabled());
    }

    #[test]
    fn test_watchdog_nudges_and_reloads() {
        let mut h = harness(desktop(), None, &[360, 720]);
        h.player.set_time(12.0);
        h.session.handle_event(PlayerEvent::Playing, secs(0.5));
        h.session.handle_event(PlayerEvent::Waiting, secs(1.0));
        assert_eq!(h.session.status(), PlaybackStatus::Buffering);

        h.session.poll_timers(secs(5.0));
        assert_eq!(h.session.stall_count(), 1);
        let seeks = h.player.snapshot().seeks;
        assert_eq!(seeks.len(), 1);
        assert!((seeks[0] - 12.05).abs() < 1e-9);
        assert_eq!(h.loader.snapshot().start_loads, 2);
        assert!(h.session.is_timer_armed(TimerKind::StallWatchdog));
    }

    #[test]
    fn test_nudge_is_not_a_user_seek() {
        let mut h = harness(desktop(), None, &[360, 720]);
        h.player.set_time(40.0);
        h.session.handle_event(PlayerEvent::TimeUpdate { time: 40.0 }, secs(0.5));
        h.session.handle_event(PlayerEvent::Waiting, secs(1.0));
        h.session.poll_timers(secs(5.0));

        let stop_loads = h.loader.snapshot().stop_loads;
        h.session.handle_event(PlayerEvent::Seeking, secs(5.01));
        h.session.handle_event(PlayerEvent::Seeked, secs(5.02));

        assert_eq!(h.loader.snapshot().stop_loads, stop_loads);
        assert!(!h.session.is_timer_armed(TimerKind::SeekDebounce));
        assert!((h.session.last_known_time() - 40.05).abs() < 1e-9);
        assert_eq!(h.session.state(), PlaybackState::Buffering);
    }

    #[test]
    fn test_seek_pauses_loading_until_debounce() {
        let mut h = harness(desktop(), None, &[360, 720]);
        h.session.handle_event(PlayerEvent::TimeUpdate { time: 20.0 }, secs(1.0));
        h.player.set_time(25.0);
        h.session.handle_event(PlayerEvent::Seeking, secs(2.0));

        let snapshot = h.loader.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(h.session.state(), PlaybackState::Seeking);

        h.session.poll_timers(secs(2.25));
        assert!(h.loader.snapshot().loading);

        h.session.handle_event(PlayerEvent::Seeked, secs(2.4));
        h.session.handle_event(PlayerEvent::CanPlay, secs(2.6));
        assert_eq!(h.session.state(), PlaybackState::Ready);
        assert_eq!(h.session.last_known_time(), 25.0);
    }

    #[test]
    fn test_canplay_shortens_seek_restore() {
        let mut h = harness(desktop(), None, &[240, 360, 480, 720]);
        h.session.handle_event(PlayerEvent::TimeUpdate { time: 60.0 }, secs(1.0));
        h.player.set_time(10.0);
        h.session.handle_event(PlayerEvent::Seeking, secs(2.0));
        assert!(!h.session.auto_selection_enabled());

        h.session.handle_event(PlayerEvent::Seeked, secs(2.2));
        h.session.handle_event(PlayerEvent::CanPlay, secs(3.0));

        h.session.poll_timers(secs(5.9));
        assert!(!h.session.auto_selection_enabled());
        h.session.poll_timers(secs(6.0));
        assert!(h.session.auto_selection_enabled());
    }

    #[test]
    fn test_frozen_frame_on_constrained_platform() {
        let host = HostEnvironment {
            viewport_width: 390,
            viewport_height: 844,
            low_power_engine: true,
            native_playback: false,
        };
        let mut h = harness(host, Some("4g"), &[360, 720]);
        h.player.set_paused(false);
        h.player.set_time(5.0);
        h.session.handle_event(PlayerEvent::Playing, secs(1.0));

        // Playhead stuck at 5.0
        h.session.poll_timers(secs(3.0));

        let seeks = h.player.snapshot().seeks;
        assert_eq!(seeks.len(), 1);
        assert!((seeks[0] - 5.05).abs() < 1e-9);
        assert_eq!(h.session.stall_count(), 0);
        assert!(h.session.is_timer_armed(TimerKind::FrozenFramePoll));
    }

    #[test]
    fn test_no_frozen_watch_on_desktop() {
        let mut h = harness(desktop(), None, &[360, 720]);
        h.session.handle_event(PlayerEvent::Playing, secs(1.0));
        assert!(!h.session.is_timer_armed(TimerKind::FrozenFramePoll));
    }

    #[test]
    fn test_warmup_widens_buffer_once() {
        let mut h = harness(desktop(), None, &[360, 720]);
        h.session.handle_event(PlayerEvent::Playing, secs(1.0));
        h.session.poll_timers(secs(4.0));

        let targets = h.loader.snapshot().buffer_targets;
        assert_eq!(targets.len(), 2);
        assert!(targets[1].forward_secs > targets[0].forward_secs);

        h.session.handle_event(PlayerEvent::Waiting, secs(5.0));
        h.session.handle_event(PlayerEvent::Playing, secs(5.5));
        assert!(!h.session.is_timer_armed(TimerKind::BufferWarmup));
    }

    #[test]
    fn test_waiting_cancels_warmup() {
        let mut h = harness(desktop(), None, &[360, 720]);
        h.session.handle_event(PlayerEvent::Playing, secs(1.0));
        h.session.handle_event(PlayerEvent::Waiting, secs(2.0));
        h.session.poll_timers(secs(4.5));

        assert_eq!(h.loader.snapshot().buffer_targets.len(), 1);
    }

    #[test]
    fn test_pause_cancels_warmup() {
        let mut h = harness(desktop(), None, &[360, 720]);
        h.session.handle_event(PlayerEvent::Playing, secs(1.0));
        h.session.handle_event(PlayerEvent::Pause, secs(1.5));
        h.session.poll_timers(secs(4.5));
        assert_eq!(h.loader.snapshot().buffer_targets.len(), 1);
        assert!(!h.session.is_timer_armed(TimerKind::BufferWarmup));

        // Playing again restarts the warm-up window
        h.session.handle_event(PlayerEvent::Playing, secs(5.0));
        h.session.poll_timers(secs(7.5));
        assert_eq!(h.loader.snapshot().buffer_targets.len(), 1);
        h.session.poll_timers(secs(8.0));
        let targets = h.loader.snapshot().buffer_targets;
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].forward_secs, 30.0);
    }

    #[test]
    fn test_fatal_network_retried_once() {
        let mut h = harness(desktop(), None, &[360, 720]);
        let error = MediaError::fatal(MediaErrorKind::Network, "fragLoadError");

        h.session.handle_event(PlayerEvent::Error(error.clone()), secs(1.0));
        assert_eq!(h.session.state(), PlaybackState::Ready);
        assert_eq!(h.loader.snapshot().start_loads, 2);

        h.session.handle_event(PlayerEvent::Error(error), secs(2.0));
        assert_eq!(h.session.state(), PlaybackState::Error);
        assert!(matches!(h.session.status(), PlaybackStatus::Error { .. }));
        assert_eq!(h.session.armed_timers(), 0);
    }

    #[test]
    fn test_fatal_decode_recovers_once() {
        let mut h = harness(desktop(), None, &[360, 720]);
        let error = MediaError::fatal(MediaErrorKind::Decode, "bufferAppendError");

        h.session.handle_event(PlayerEvent::Error(error.clone()), secs(1.0));
        assert_eq!(h.loader.snapshot().recoveries, 1);
        h.session.handle_event(PlayerEvent::Error(error), secs(2.0));
        assert_eq!(h.loader.snapshot().recoveries, 1);
        assert_eq!(h.session.state(), PlaybackState::Error);
    }

    #[test]
    fn test_other_fatal_destroys_loader() {
        let mut h = harness(desktop(), None, &[360, 720]);
        h.session
            .handle_event(PlayerEvent::Error(MediaError::fatal(MediaErrorKind::Other, "internal")), secs(1.0));

        assert_eq!(h.session.state(), PlaybackState::Error);
        assert_eq!(h.loader.snapshot().destroyed, 1);

        // Teardown does not destroy the loader twice
        h.session.destroy(secs(2.0));
        assert_eq!(h.loader.snapshot().destroyed, 1);
    }

    #[test]
    fn test_non_fatal_error_only_logged() {
        let mut h = harness(desktop(), None, &[360, 720]);
        h.session.handle_event(
            PlayerEvent::Error(MediaError::non_fatal(MediaErrorKind::Network, "fragLoadTimeOut")),
            secs(1.0),
        );
        assert_eq!(h.session.state(), PlaybackState::Ready);
        assert_eq!(h.loader.snapshot().start_loads, 1);
    }

    #[test]
    fn test_manifest_failure_is_terminal() {
        let player = SimPlayer::new();
        let loader = SimFragmentLoader::new(Vec::new());
        let mut session = PlaybackSession::new(
            SessionOptions::new(source()),
            ControllerConfig::default(),
            desktop(),
            Box::new(StaticSignal::absent()),
            Box::new(player),
            Box::new(loader),
        );
        let status = session.subscribe_status();

        session.begin_loading(Duration::ZERO);
        session.fail_manifest(Error::ManifestFetch("404".into()), secs(1.0));

        assert_eq!(session.state(), PlaybackState::Error);
        assert_eq!(
            *status.borrow(),
            PlaybackStatus::Error {
                message: Error::ManifestFetch(String::new()).user_message().to_string()
            }
        );
    }

    #[test]
    fn test_autoplay_suppressed_on_mobile() {
        for (width, expected) in [(1280, 1), (390, 0)] {
            let player = SimPlayer::new();
            let host = HostEnvironment {
                viewport_width: width,
                ..Default::default()
            };
            let mut session = PlaybackSession::new(
                SessionOptions::new(source()).with_autoplay(true).with_muted(true),
                ControllerConfig::default(),
                host,
                Box::new(StaticSignal::absent()),
                Box::new(player.clone()),
                Box::new(SimFragmentLoader::new(Vec::new())),
            );
            if let Some(url) = session.begin_loading(Duration::ZERO) {
                session.attach_manifest(Manifest::new(url.clone(), ladder(&url, &[360])), Duration::ZERO);
            }
            let snapshot = player.snapshot();
            assert_eq!(snapshot.play_calls, expected, "viewport {width}");
            assert!(snapshot.muted);
        }
    }

    #[test]
    fn test_native_mode_maps_events_only() {
        let player = SimPlayer::new();
        let loader = SimFragmentLoader::new(Vec::new());
        let host = HostEnvironment {
            native_playback: true,
            ..desktop()
        };
        let mut session = PlaybackSession::new(
            SessionOptions::new(source()),
            ControllerConfig::default(),
            host,
            Box::new(StaticSignal::new("slow-2g")),
            Box::new(player.clone()),
            Box::new(loader.clone()),
        );

        assert_eq!(session.begin_loading(Duration::ZERO), None);
        assert_eq!(player.snapshot().source, Some(source()));

        session.handle_event(PlayerEvent::Playing, secs(1.0));
        assert_eq!(session.state(), PlaybackState::Playing);
        session.handle_event(PlayerEvent::Waiting, secs(2.0));
        assert_eq!(session.status(), PlaybackStatus::Buffering);
        session.poll_timers(secs(10.0));

        let snapshot = loader.snapshot();
        assert_eq!(snapshot.start_loads, 0);
        assert_eq!(snapshot.level_writes, 0);
        assert_eq!(session.stall_count(), 0);
        assert_eq!(session.armed_timers(), 0);
    }

    #[test]
    fn test_status_channel_publishes_changes_only() {
        let mut h = harness(desktop(), None, &[360, 720]);
        let mut status = h.session.subscribe_status();
        status.borrow_and_update();

        // Ready -> Playing keeps the status at ready
        h.session.handle_event(PlayerEvent::Playing, secs(1.0));
        assert!(!status.has_changed().unwrap());

        h.session.handle_event(PlayerEvent::Waiting, secs(2.0));
        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), PlaybackStatus::Buffering);
    }
}
