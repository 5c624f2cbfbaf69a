//! In-memory collaborators and trace replay
//!
//! [`SimPlayer`] and [`SimFragmentLoader`] record every call the controller
//! makes so tests and the CLI can inspect them. Both are cheap to clone;
//! clones share state, so a test keeps one clone while the session owns
//! the other.

use crate::config::ControllerConfig;
use crate::events::EventRecord;
use crate::manifest::{Manifest, ManifestLoader};
use crate::network::StaticSignal;
use crate::primitive::{FragmentLoader, PlaybackPrimitive, PlayerEvent};
use crate::session::PlaybackSession;
use crate::types::*;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;
use url::Url;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a rendition ladder from heights, ascending, with 16:9 widths and
/// bitrates proportional to height
pub fn ladder(base: &Url, heights: &[u32]) -> Vec<Rendition> {
    heights
        .iter()
        .enumerate()
        .map(|(index, &height)| Rendition {
            index,
            bitrate: Some(height as u64 * 4_000),
            resolution: Some(Resolution::new(height * 16 / 9, height)),
            uri: base.join(&format!("{height}p.m3u8")).unwrap_or_else(|_| base.clone()),
            codecs: None,
        })
        .collect()
}

/// Observable state of a [`SimPlayer`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub source: Option<Url>,
    pub poster: Option<Url>,
    pub current_time: f64,
    pub paused: bool,
    pub muted: bool,
    pub play_calls: u32,
    /// Every playhead write, in order
    pub seeks: Vec<f64>,
}

/// In-memory media element
#[derive(Debug, Clone)]
pub struct SimPlayer {
    state: Arc<Mutex<PlayerSnapshot>>,
}

impl SimPlayer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PlayerSnapshot {
                paused: true,
                ..Default::default()
            })),
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        lock(&self.state).clone()
    }

    /// Move the playhead as the host would, without recording a write
    pub fn set_time(&self, time: f64) {
        lock(&self.state).current_time = time;
    }

    pub fn set_paused(&self, paused: bool) {
        lock(&self.state).paused = paused;
    }
}

impl Default for SimPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackPrimitive for SimPlayer {
    fn attach_source(&mut self, source: &Url, poster: Option<&Url>) {
        let mut state = lock(&self.state);
        state.source = Some(source.clone());
        state.poster = poster.cloned();
    }

    fn play(&mut self) {
        let mut state = lock(&self.state);
        state.play_calls += 1;
        state.paused = false;
    }

    fn set_muted(&mut self, muted: bool) {
        lock(&self.state).muted = muted;
    }

    fn current_time(&self) -> f64 {
        lock(&self.state).current_time
    }

    fn set_current_time(&mut self, time: f64) {
        let mut state = lock(&self.state);
        state.current_time = time;
        state.seeks.push(time);
    }

    fn paused(&self) -> bool {
        lock(&self.state).paused
    }
}

/// Observable state of a [`SimFragmentLoader`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoaderSnapshot {
    /// Manifest bound with `load_source`
    pub source: Option<Url>,
    pub loading: bool,
    pub start_loads: u32,
    pub stop_loads: u32,
    pub current_level: i64,
    pub auto_level_enabled: bool,
    pub next_auto_level: Option<usize>,
    /// Writes to any level field
    pub level_writes: u32,
    /// Every buffer target configuration, in order
    pub buffer_targets: Vec<BufferTargets>,
    pub recoveries: u32,
    pub destroyed: u32,
}

impl Default for LoaderSnapshot {
    fn default() -> Self {
        Self {
            source: None,
            loading: false,
            start_loads: 0,
            stop_loads: 0,
            current_level: -1,
            auto_level_enabled: true,
            next_auto_level: None,
            level_writes: 0,
            buffer_targets: Vec::new(),
            recoveries: 0,
            destroyed: 0,
        }
    }
}

/// In-memory fragment loader
#[derive(Debug, Clone)]
pub struct SimFragmentLoader {
    levels: Arc<[Rendition]>,
    state: Arc<Mutex<LoaderSnapshot>>,
}

impl SimFragmentLoader {
    pub fn new(levels: Vec<Rendition>) -> Self {
        Self {
            levels: levels.into(),
            state: Arc::new(Mutex::new(LoaderSnapshot::default())),
        }
    }

    pub fn snapshot(&self) -> LoaderSnapshot {
        lock(&self.state).clone()
    }
}

impl FragmentLoader for SimFragmentLoader {
    fn load_source(&mut self, manifest: &Manifest) {
        self.levels = manifest.renditions.clone();
        lock(&self.state).source = Some(manifest.source.clone());
    }

    fn start_load(&mut self) {
        let mut state = lock(&self.state);
        state.start_loads += 1;
        state.loading = true;
    }

    fn stop_load(&mut self) {
        let mut state = lock(&self.state);
        state.stop_loads += 1;
        state.loading = false;
    }

    fn levels(&self) -> &[Rendition] {
        &self.levels
    }

    fn current_level(&self) -> i64 {
        lock(&self.state).current_level
    }

    fn set_current_level(&mut self, level: i64) {
        let mut state = lock(&self.state);
        state.current_level = level;
        state.level_writes += 1;
    }

    fn auto_level_enabled(&self) -> bool {
        lock(&self.state).auto_level_enabled
    }

    fn set_auto_level_enabled(&mut self, enabled: bool) {
        let mut state = lock(&self.state);
        state.auto_level_enabled = enabled;
        state.level_writes += 1;
    }

    fn set_next_auto_level(&mut self, level: usize) {
        let mut state = lock(&self.state);
        state.next_auto_level = Some(level);
        state.level_writes += 1;
    }

    fn set_buffer_targets(&mut self, targets: &BufferTargets) {
        lock(&self.state).buffer_targets.push(*targets);
    }

    fn recover_media_error(&mut self) {
        lock(&self.state).recoveries += 1;
    }

    fn destroy(&mut self) {
        let mut state = lock(&self.state);
        state.destroyed += 1;
        state.loading = false;
    }
}

/// Manifest loader serving a fixed manifest, optionally failing first
#[derive(Debug)]
pub struct SimManifestLoader {
    manifest: Manifest,
    failures_left: AtomicU32,
    /// Simulated failures are parse errors rather than fetch errors
    parse_failures: bool,
    loads: AtomicU32,
}

impl SimManifestLoader {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            failures_left: AtomicU32::new(0),
            parse_failures: false,
            loads: AtomicU32::new(0),
        }
    }

    /// Fail the first `failures` loads with a fetch error
    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures_left = AtomicU32::new(failures);
        self
    }

    /// Report the simulated failures as malformed playlists
    pub fn with_parse_failures(mut self) -> Self {
        self.parse_failures = true;
        self
    }

    /// Number of load attempts so far
    pub fn loads(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestLoader for SimManifestLoader {
    async fn load(&self, url: &Url) -> Result<Manifest> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            let details = format!("{url}: simulated failure");
            return Err(if self.parse_failures {
                Error::ManifestParse(details)
            } else {
                Error::ManifestFetch(details)
            });
        }
        Ok(self.manifest.clone())
    }
}

/// A recorded session: host context plus timed player events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub source: Url,
    #[serde(default)]
    pub host: HostEnvironment,
    /// Environment network signal, absent when unsupported
    #[serde(default)]
    pub effective_type: Option<String>,
    #[serde(default)]
    pub autoplay: bool,
    #[serde(default)]
    pub muted: bool,
    /// Rendition heights, ascending
    #[serde(default)]
    pub ladder: Vec<u32>,
    pub steps: Vec<TraceStep>,
    /// Keep running timers until this session time
    #[serde(default)]
    pub end_ms: Option<u64>,
}

/// One timed step of a trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub at_ms: u64,
    /// Playhead position the element reports from this step on
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(default)]
    pub paused: Option<bool>,
    #[serde(default)]
    pub event: Option<PlayerEvent>,
}

/// A status change observed during replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub at_ms: u64,
    pub status: PlaybackStatus,
}

/// Outcome of a replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub session_id: SessionId,
    pub native: bool,
    pub timeline: Vec<StatusChange>,
    pub events: Vec<EventRecord>,
    pub stall_count: u32,
    pub current_rendition_index: i64,
    pub auto_selection_enabled: bool,
    pub buffer_targets: BufferTargets,
    pub loader: LoaderSnapshot,
    pub player: PlayerSnapshot,
    pub timers_cancelled: usize,
}

/// Replay `trace` through a session wired to in-memory collaborators.
///
/// Timers fire at their own deadlines between steps, exactly as the
/// driver task would fire them.
pub fn replay(trace: &Trace, config: ControllerConfig) -> Result<ReplayReport> {
    config.validate()?;

    let player = SimPlayer::new();
    let renditions = ladder(&trace.source, &trace.ladder);
    let loader = SimFragmentLoader::new(renditions.clone());
    let signal = match &trace.effective_type {
        Some(kind) => StaticSignal::new(kind.clone()),
        None => StaticSignal::absent(),
    };
    let options = SessionOptions::new(trace.source.clone())
        .with_autoplay(trace.autoplay)
        .with_muted(trace.muted);

    let mut session = PlaybackSession::new(
        options,
        config,
        trace.host.clone(),
        Box::new(signal),
        Box::new(player.clone()),
        Box::new(loader.clone()),
    )
    .keep_event_history();

    let mut timeline = vec![StatusChange {
        at_ms: 0,
        status: session.status(),
    }];
    let mut record = |session: &PlaybackSession, at: Duration| {
        let status = session.status();
        if timeline.last().map(|c| &c.status) != Some(&status) {
            timeline.push(StatusChange {
                at_ms: at.as_millis() as u64,
                status,
            });
        }
    };

    if let Some(url) = session.begin_loading(Duration::ZERO) {
        session.attach_manifest(Manifest::new(url, renditions), Duration::ZERO);
    }
    record(&session, Duration::ZERO);

    let mut steps: Vec<&TraceStep> = trace.steps.iter().collect();
    steps.sort_by_key(|s| s.at_ms);

    for step in steps {
        let now = Duration::from_millis(step.at_ms);
        run_timers_until(&mut session, now, &mut record);

        if let Some(time) = step.time {
            player.set_time(time);
        }
        if let Some(paused) = step.paused {
            player.set_paused(paused);
        }
        if let Some(event) = step.event.clone() {
            debug!(at_ms = step.at_ms, event = event.name(), "Replaying event");
            session.handle_event(event, now);
        }
        record(&session, now);
    }

    if let Some(end_ms) = trace.end_ms {
        run_timers_until(&mut session, Duration::from_millis(end_ms), &mut record);
    }

    let stall_count = session.stall_count();
    let current_rendition_index = session.current_rendition_index();
    let auto_selection_enabled = session.auto_selection_enabled();
    let buffer_targets = session.buffer_targets();
    let timers_cancelled = session.destroy(session.last_activity());

    Ok(ReplayReport {
        session_id: session.id(),
        native: session.is_native(),
        timeline,
        events: session.event_history().to_vec(),
        stall_count,
        current_rendition_index,
        auto_selection_enabled,
        buffer_targets,
        loader: loader.snapshot(),
        player: player.snapshot(),
        timers_cancelled,
    })
}

fn run_timers_until(
    session: &mut PlaybackSession,
    until: Duration,
    record: &mut impl FnMut(&PlaybackSession, Duration),
) {
    while let Some(deadline) = session.next_deadline().filter(|d| *d <= until) {
        session.poll_timers(deadline);
        record(session, deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://cdn.example.com/show/master.m3u8").unwrap()
    }

    #[test]
    fn test_ladder_resolves_variant_uris() {
        let renditions = ladder(&url(), &[360, 720]);
        assert_eq!(renditions[1].uri.as_str(), "https://cdn.example.com/show/720p.m3u8");
        assert_eq!(renditions[1].height(), Some(720));
        assert_eq!(renditions[0].index, 0);
    }

    #[test]
    fn test_clones_share_state() {
        let loader = SimFragmentLoader::new(Vec::new());
        let mut owned: Box<dyn FragmentLoader> = Box::new(loader.clone());
        owned.start_load();
        owned.set_current_level(2);

        let snapshot = loader.snapshot();
        assert_eq!(snapshot.start_loads, 1);
        assert_eq!(snapshot.current_level, 2);
        assert!(snapshot.loading);
    }

    #[tokio::test]
    async fn test_manifest_loader_fails_first() {
        let loader = SimManifestLoader::new(Manifest::new(url(), ladder(&url(), &[360]))).failing_first(1);

        assert!(loader.load(&url()).await.is_err());
        assert!(loader.load(&url()).await.is_ok());
        assert_eq!(loader.loads(), 2);
    }

    #[test]
    fn test_trace_json_shape() {
        let trace: Trace = serde_json::from_str(
            r#"{
                "source": "https://cdn.example.com/show/master.m3u8",
                "host": { "viewport_width": 390, "viewport_height": 844 },
                "effective_type": "3g",
                "ladder": [240, 360, 480, 720],
                "steps": [
                    { "at_ms": 500, "event": { "type": "can_play" } },
                    { "at_ms": 900, "time": 0.4, "event": { "type": "playing" } }
                ],
                "end_ms": 12000
            }"#,
        )
        .unwrap();

        assert_eq!(trace.steps.len(), 2);
        assert_eq!(trace.steps[1].event, Some(PlayerEvent::Playing));
        assert!(!trace.host.low_power_engine);
    }

    #[test]
    fn test_replay_restores_auto_after_moderate_pick() {
        let trace = Trace {
            source: url(),
            host: HostEnvironment {
                viewport_width: 390,
                viewport_height: 844,
                ..Default::default()
            },
            effective_type: Some("3g".into()),
            autoplay: false,
            muted: false,
            ladder: vec![240, 360, 480, 720],
            steps: vec![
                TraceStep {
                    at_ms: 500,
                    time: None,
                    paused: Some(false),
                    event: Some(PlayerEvent::CanPlay),
                },
                TraceStep {
                    at_ms: 600,
                    time: Some(0.1),
                    paused: None,
                    event: Some(PlayerEvent::Playing),
                },
            ],
            end_ms: Some(10_001),
        };

        let report = replay(&trace, ControllerConfig::default()).unwrap();
        assert!(report.auto_selection_enabled);
        assert_eq!(report.current_rendition_index, -1);
        assert_eq!(report.timeline.last().map(|c| &c.status), Some(&PlaybackStatus::Ready));
        assert!(!report.events.is_empty());
        assert_eq!(report.loader.destroyed, 1);
    }
}
