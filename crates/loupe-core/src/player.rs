//! Player driver
//!
//! Hosts one [`PlaybackSession`] inside a tokio task. The task owns the
//! session exclusively: host events arrive over a command channel, timers
//! are served with `sleep_until` on the session's next deadline, and the
//! manifest is fetched asynchronously while events keep flowing.
//!
//! ```text
//!  host ── dispatch() ──► mpsc ──► ┌─────────────┐ ──► watch<PlaybackStatus>
//!                                  │ driver task │
//!  ManifestLoader ◄── load ─────── │  (session)  │ ──► broadcast<EventRecord>
//!                                  └─────────────┘
//! ```

use crate::{
    config::ControllerConfig,
    events::EventRecord,
    manifest::{Manifest, ManifestLoader},
    network::EnvironmentSignal,
    primitive::{FragmentLoader, PlaybackPrimitive, PlayerEvent},
    session::PlaybackSession,
    types::*,
    Error, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn, Instrument};
use url::Url;

/// Wake-up used when no timer is armed; the branch is disabled anyway
const IDLE_WAKE: Duration = Duration::from_secs(3600);

enum Command {
    Event(PlayerEvent),
    Destroy(Option<oneshot::Sender<usize>>),
}

/// Handle to a running player
pub struct PlayerHandle {
    id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<PlaybackStatus>,
    events: broadcast::Receiver<EventRecord>,
}

impl PlayerHandle {
    /// Validate `config`, create the session and start its driver task.
    ///
    /// Must be called from within a tokio runtime.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        options: SessionOptions,
        config: ControllerConfig,
        host: HostEnvironment,
        signal: Box<dyn EnvironmentSignal>,
        manifest_loader: Arc<dyn ManifestLoader>,
        primitive: Box<dyn PlaybackPrimitive>,
        loader: Box<dyn FragmentLoader>,
    ) -> Result<Self> {
        config.validate()?;
        let retries = config.manifest_retries;

        let session = PlaybackSession::new(options, config, host, signal, primitive, loader);
        let id = session.id();
        let status = session.subscribe_status();
        let events = session.subscribe_events();
        let (tx, rx) = mpsc::unbounded_channel();

        let span = tracing::info_span!("player", session_id = %id);
        tokio::spawn(run(session, manifest_loader, retries, rx).instrument(span));
        info!(session_id = %id, "Player started");

        Ok(Self {
            id,
            commands: tx,
            status,
            events,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Forward a primitive or loader event to the session
    pub fn dispatch(&self, event: PlayerEvent) -> Result<()> {
        self.commands
            .send(Command::Event(event))
            .map_err(|_| Error::SessionDestroyed)
    }

    /// Status receiver; only changes are published
    pub fn status(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.clone()
    }

    /// Latest published status
    pub fn current_status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to session events from now on
    pub fn events(&self) -> broadcast::Receiver<EventRecord> {
        self.events.resubscribe()
    }

    /// Tear the session down and wait for the driver to finish.
    ///
    /// Idempotent: returns the number of timers cancelled, zero once the
    /// session is already gone.
    pub async fn destroy(&self) -> usize {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Destroy(Some(reply))).is_err() {
            return 0;
        }
        done.await.unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Destroy(None));
    }
}

async fn run(
    mut session: PlaybackSession,
    manifest_loader: Arc<dyn ManifestLoader>,
    retries: u32,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let epoch = Instant::now();

    if let Some(url) = session.begin_loading(epoch.elapsed()) {
        let load = load_manifest(manifest_loader, url, retries);
        tokio::pin!(load);

        loop {
            tokio::select! {
                result = &mut load => {
                    let now = epoch.elapsed();
                    match result {
                        Ok(manifest) => session.attach_manifest(manifest, now),
                        Err(e) => session.fail_manifest(e, now),
                    }
                    break;
                }
                command = commands.recv() => {
                    if !apply(&mut session, command, epoch.elapsed()) {
                        commands.close();
                        return;
                    }
                }
            }
        }
    }

    loop {
        let deadline = session.next_deadline();
        let wake = epoch + deadline.unwrap_or_else(|| epoch.elapsed() + IDLE_WAKE);

        tokio::select! {
            command = commands.recv() => {
                if !apply(&mut session, command, epoch.elapsed()) {
                    break;
                }
            }
            _ = sleep_until(wake), if deadline.is_some() => {
                session.poll_timers(epoch.elapsed());
            }
        }
    }

    // Nothing queued behind a destroy can reach the session
    commands.close();
    debug!("Player task finished");
}

/// Apply one command; returns false once the session is destroyed
fn apply(session: &mut PlaybackSession, command: Option<Command>, now: Duration) -> bool {
    match command {
        Some(Command::Event(event)) => {
            session.handle_event(event, now);
            true
        }
        Some(Command::Destroy(reply)) => {
            let cancelled = session.destroy(now);
            if let Some(reply) = reply {
                let _ = reply.send(cancelled);
            }
            false
        }
        None => {
            session.destroy(now);
            false
        }
    }
}

/// Load the manifest, retrying recoverable failures silently
async fn load_manifest(loader: Arc<dyn ManifestLoader>, url: Url, retries: u32) -> Result<Manifest> {
    let mut attempt = 0;
    loop {
        match loader.load(&url).await {
            Ok(manifest) => return Ok(manifest),
            // Fetch and parse failures both get the silent retry
            Err(e) if attempt < retries && (e.is_recoverable() || e.is_manifest_error()) => {
                attempt += 1;
                warn!(%url, error = %e, attempt, "Manifest load failed; retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::StaticSignal;
    use crate::sim::{ladder, SimFragmentLoader, SimManifestLoader, SimPlayer};

    fn source() -> Url {
        Url::parse("https://cdn.example.com/live/master.m3u8").unwrap()
    }

    fn spawn(manifest_loader: Arc<SimManifestLoader>, loader: SimFragmentLoader) -> PlayerHandle {
        PlayerHandle::spawn(
            SessionOptions::new(source()),
            ControllerConfig::default(),
            HostEnvironment::default(),
            Box::new(StaticSignal::absent()),
            manifest_loader,
            Box::new(SimPlayer::new()),
            Box::new(loader),
        )
        .unwrap()
    }

    fn manifest() -> Manifest {
        Manifest::new(source(), ladder(&source(), &[360, 720]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_becomes_ready_after_manifest() {
        let loader = SimFragmentLoader::new(Vec::new());
        let handle = spawn(Arc::new(SimManifestLoader::new(manifest())), loader.clone());
        let mut status = handle.status();

        status.wait_for(|s| *s == PlaybackStatus::Ready).await.unwrap();
        assert_eq!(loader.snapshot().start_loads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manifest_retried_once() {
        let manifest_loader = Arc::new(SimManifestLoader::new(manifest()).failing_first(1));
        let handle = spawn(manifest_loader.clone(), SimFragmentLoader::new(Vec::new()));
        let mut status = handle.status();

        status.wait_for(|s| *s == PlaybackStatus::Ready).await.unwrap();
        assert_eq!(manifest_loader.loads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_manifest_retried_once() {
        let manifest_loader = Arc::new(
            SimManifestLoader::new(manifest())
                .failing_first(1)
                .with_parse_failures(),
        );
        let handle = spawn(manifest_loader.clone(), SimFragmentLoader::new(Vec::new()));
        let mut status = handle.status();

        status.wait_for(|s| *s == PlaybackStatus::Ready).await.unwrap();
        assert_eq!(manifest_loader.loads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_parse_failure_surfaces_error() {
        let manifest_loader = Arc::new(
            SimManifestLoader::new(manifest())
                .failing_first(2)
                .with_parse_failures(),
        );
        let handle = spawn(manifest_loader.clone(), SimFragmentLoader::new(Vec::new()));
        let mut status = handle.status();

        status
            .wait_for(|s| matches!(s, PlaybackStatus::Error { .. }))
            .await
            .unwrap();
        assert_eq!(manifest_loader.loads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manifest_failure_surfaces_error() {
        let manifest_loader = Arc::new(SimManifestLoader::new(manifest()).failing_first(2));
        let handle = spawn(manifest_loader, SimFragmentLoader::new(Vec::new()));
        let mut status = handle.status();

        status
            .wait_for(|s| matches!(s, PlaybackStatus::Error { .. }))
            .await
            .unwrap();
        assert!(matches!(handle.current_status(), PlaybackStatus::Error { .. }));
        assert!(handle.dispatch(PlayerEvent::Playing).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_is_idempotent() {
        let loader = SimFragmentLoader::new(Vec::new());
        let handle = spawn(Arc::new(SimManifestLoader::new(manifest())), loader.clone());
        handle.status().wait_for(|s| *s == PlaybackStatus::Ready).await.unwrap();
        handle.dispatch(PlayerEvent::Playing).unwrap();

        // Health window and buffer warm-up are armed
        assert_eq!(handle.destroy().await, 2);
        assert_eq!(handle.destroy().await, 0);
        assert!(handle.dispatch(PlayerEvent::Waiting).is_err());
        assert_eq!(loader.snapshot().destroyed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_fire_on_session_clock() {
        let loader = SimFragmentLoader::new(Vec::new());
        let handle = spawn(Arc::new(SimManifestLoader::new(manifest())), loader.clone());
        handle.status().wait_for(|s| *s == PlaybackStatus::Ready).await.unwrap();

        handle.dispatch(PlayerEvent::Playing).unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;

        // Warm-up widened the buffer targets
        assert_eq!(loader.snapshot().buffer_targets.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_destroys_session() {
        let loader = SimFragmentLoader::new(Vec::new());
        let handle = spawn(Arc::new(SimManifestLoader::new(manifest())), loader.clone());
        handle.status().wait_for(|s| *s == PlaybackStatus::Ready).await.unwrap();

        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(loader.snapshot().destroyed, 1);
    }
}
