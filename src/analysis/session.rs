// src/analysis/session.rs — One source's supervised pipeline
//
// A session owns its transcoder and detection feed outright. Its status and
// latest result are written only from inside: the run sequence, the event
// consumer, and the health monitor. Everyone else reads snapshots.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::infra::config::{Config, SourceConfig};
use crate::infra::errors::Result;

use super::monitor::{HealthMonitor, RestartPolicy};
use super::registry::ResultBoard;
use super::{
    DetectionEvent, DetectionFeed, DetectionResult, EventDecoder, EventSender, PipelineBackend,
    RelayAddress, SessionSnapshot, SessionStatus, Transcoder,
};

/// Detection events buffered between the feed and the consumer.
const EVENT_BUFFER: usize = 64;

/// Timing knobs shared by every session of a registry.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Wait between the transcoder starting and the feed attaching.
    pub feed_grace: Duration,
    pub health_interval: Duration,
    /// Per-task bound on how long a stop waits before aborting it.
    pub stop_timeout: Duration,
    pub restart: RestartPolicy,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            feed_grace: config.analysis.feed_grace(),
            health_interval: config.analysis.health_check_interval(),
            stop_timeout: config.analysis.stop_timeout(),
            restart: RestartPolicy::from_config(&config.restart),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionState {
    status: SessionStatus,
    result: DetectionResult,
}

fn lock<T>(m: &StdMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Session {
    source: SourceConfig,
    relay: RelayAddress,
    settings: SessionSettings,
    decoder: Arc<dyn EventDecoder>,
    board: ResultBoard,
    state: RwLock<SessionState>,
    transcoder: Mutex<Box<dyn Transcoder>>,
    feed: Mutex<Box<dyn DetectionFeed>>,
    events_tx: EventSender,
    events_rx: StdMutex<Option<mpsc::Receiver<DetectionEvent>>>,
    cancel: CancellationToken,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        source: SourceConfig,
        relay: RelayAddress,
        settings: SessionSettings,
        decoder: Arc<dyn EventDecoder>,
        board: ResultBoard,
        backend: &dyn PipelineBackend,
    ) -> Arc<Self> {
        let transcoder = backend.transcoder(&source, &relay);
        let feed = backend.detection_feed(&source);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        Arc::new(Self {
            source,
            relay,
            settings,
            decoder,
            board,
            state: RwLock::new(SessionState {
                status: SessionStatus::Starting,
                result: DetectionResult::default(),
            }),
            transcoder: Mutex::new(transcoder),
            feed: Mutex::new(feed),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            cancel: CancellationToken::new(),
            tasks: StdMutex::new(Vec::new()),
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source.id
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn relay(&self) -> &RelayAddress {
        &self.relay
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn status(&self) -> SessionStatus {
        self.read_state().status
    }

    pub fn latest_result(&self) -> DetectionResult {
        self.read_state().result
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.read_state();
        SessionSnapshot {
            source_id: self.source.id.clone(),
            status: state.status,
            result: state.result,
            relay_url: self.relay.url(),
        }
    }

    /// True once `stop` has begun; nothing but `Stopped` is written after.
    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn read_state(&self) -> SessionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a status change. `Stopped` always wins; `Error` and `Stopped`
    /// are never left otherwise; a stopping session accepts nothing else.
    pub(crate) fn transition(&self, next: SessionStatus) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let current = state.status;
        let allowed = match (current, next) {
            (_, SessionStatus::Stopped) => true,
            (SessionStatus::Stopped, _) | (SessionStatus::Error, _) => false,
            _ => !self.is_stopping(),
        };
        if allowed && current != next {
            tracing::info!("Session '{}': {} -> {}", self.source.id, current, next);
            state.status = next;
        }
    }

    fn record_result(&self, result: DetectionResult) {
        if self.is_stopping() {
            tracing::debug!("Discarding late detection for '{}'", self.source.id);
            return;
        }
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .result = result;
        self.board.publish(&self.source.id, result);
        tracing::debug!("'{}': {} detected", self.source.id, result.count);
    }

    /// Spawn the run sequence and event consumer. Returns immediately.
    pub fn launch(self: &Arc<Self>) {
        if let Some(rx) = lock(&self.events_rx).take() {
            self.spawn_guarded("events", Arc::clone(self).consume_events(rx));
        }
        self.spawn_guarded("run", Arc::clone(self).run_sequence());
    }

    /// Spawn a supervisory task. A panic inside it maps to `Error` instead
    /// of tearing anything else down. Refuses once stopping has begun.
    fn spawn_guarded<F>(self: &Arc<Self>, task: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = lock(&self.tasks);
        if self.is_stopping() {
            return;
        }
        let session = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                tracing::error!("Session '{}': {} task panicked", session.source.id, task);
                session.transition(SessionStatus::Error);
            }
        }));
    }

    /// Transcoder first, then the feed against its relay, then monitoring.
    async fn run_sequence(self: Arc<Self>) {
        tracing::info!(
            "Starting analysis for '{}' ({})",
            self.source.id,
            self.source.source_url
        );

        match self.start_transcoder().await {
            Ok(()) => {
                self.transition(SessionStatus::TranscodeUp);
                match self.attach_feed().await {
                    Ok(()) => self.transition(SessionStatus::Online),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        self.transition(SessionStatus::FeedError);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("{}", e);
                self.transition(SessionStatus::TranscodeError);
            }
        }

        let monitor = HealthMonitor::new(Arc::clone(&self));
        self.spawn_guarded("health", monitor.run());
    }

    async fn consume_events(self: Arc<Self>, mut rx: mpsc::Receiver<DetectionEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            let Some(event) = event else { break };
            let result = self.decoder.normalize(&event, Utc::now());
            self.record_result(result);
        }
    }

    /// Sleep for `duration` unless the session stops first. Returns whether
    /// the full duration elapsed.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn start_transcoder(&self) -> Result<()> {
        self.transcoder.lock().await.start().await
    }

    /// Grace delay, then attach the feed to the relay.
    async fn attach_feed(&self) -> Result<()> {
        if !self.pause(self.settings.feed_grace).await {
            return Ok(());
        }
        let mut feed = self.feed.lock().await;
        feed.start(&self.relay.url(), self.events_tx.clone()).await
    }

    pub(crate) async fn transcoder_alive(&self) -> bool {
        self.transcoder.lock().await.is_alive()
    }

    pub(crate) async fn feed_running(&self) -> bool {
        self.feed.lock().await.is_running()
    }

    /// Reclaim the dead transcoder and launch a new one.
    pub(crate) async fn restart_transcoder(&self) -> bool {
        if self.is_stopping() {
            return false;
        }
        tracing::warn!("Transcoder for '{}' is down; restarting", self.source.id);
        let outcome = {
            let mut transcoder = self.transcoder.lock().await;
            transcoder.stop().await;
            transcoder.start().await
        };
        match outcome {
            Ok(()) => {
                let next = if self.feed_running().await {
                    SessionStatus::Online
                } else {
                    SessionStatus::TranscodeUp
                };
                self.transition(next);
                true
            }
            Err(e) => {
                tracing::warn!("{}", e);
                self.transition(SessionStatus::TranscodeError);
                false
            }
        }
    }

    /// Halt the detached feed and attach a fresh one.
    pub(crate) async fn restart_feed(&self) -> bool {
        if self.is_stopping() {
            return false;
        }
        tracing::warn!("Detection feed for '{}' is down; restarting", self.source.id);
        self.feed.lock().await.stop().await;
        match self.attach_feed().await {
            Ok(()) => {
                self.transition(SessionStatus::Online);
                true
            }
            Err(e) => {
                tracing::warn!("{}", e);
                self.transition(SessionStatus::FeedError);
                false
            }
        }
    }

    /// Restart budget exhausted: park in `Error` until an explicit stop.
    pub(crate) fn give_up(&self, supervisor: &str, attempts: u32) {
        tracing::error!(
            "Session '{}': {} still down after {} restart attempt(s); giving up",
            self.source.id,
            supervisor,
            attempts
        );
        self.transition(SessionStatus::Error);
    }

    /// Cancel all supervisory tasks, wait for them (aborting stragglers),
    /// then release both supervisors. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();

        // Tasks may still register a child task before noticing the cancel,
        // so drain until nothing new shows up.
        loop {
            let handles = std::mem::take(&mut *lock(&self.tasks));
            if handles.is_empty() {
                break;
            }
            for mut handle in handles {
                if tokio::time::timeout(self.settings.stop_timeout, &mut handle)
                    .await
                    .is_err()
                {
                    tracing::warn!(
                        "Session '{}': task did not stop within {:?}; aborting",
                        self.source.id,
                        self.settings.stop_timeout
                    );
                    handle.abort();
                }
            }
        }

        self.feed.lock().await.stop().await;
        self.transcoder.lock().await.stop().await;
        self.transition(SessionStatus::Stopped);
        tracing::info!("Session '{}' stopped", self.source.id);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("source_id", &self.source.id)
            .field("relay", &self.relay.url())
            .field("status", &self.status())
            .finish()
    }
}
