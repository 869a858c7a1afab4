// tests/common/mod.rs — Scriptable in-memory supervisors for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use surfwatch::analysis::monitor::RestartPolicy;
use surfwatch::analysis::{
    DetectionEvent, DetectionFeed, EventSender, LabelCounter, PipelineBackend, RelayAddress,
    SessionRegistry, SessionSettings, Transcoder,
};
use surfwatch::infra::config::{RelayConfig, SourceConfig};
use surfwatch::infra::errors::{Result, SurfwatchError};

/// Knobs and counters shared by every supervisor a `MockBackend` builds.
#[derive(Default)]
pub struct MockControls {
    pub transcode_fail: AtomicBool,
    pub transcode_panic: AtomicBool,
    pub feed_fail: AtomicBool,
    pub transcoder_alive: AtomicBool,
    pub feed_running: AtomicBool,
    /// How long `Transcoder::stop` takes, in milliseconds.
    pub transcoder_stop_ms: AtomicU64,
    pub transcoders_built: AtomicUsize,
    pub transcoder_starts: AtomicUsize,
    pub feed_starts: AtomicUsize,
    events: Mutex<Option<EventSender>>,
}

impl MockControls {
    pub fn transcoder_starts(&self) -> usize {
        self.transcoder_starts.load(Ordering::SeqCst)
    }

    pub fn feed_starts(&self) -> usize {
        self.feed_starts.load(Ordering::SeqCst)
    }

    pub fn transcoders_built(&self) -> usize {
        self.transcoders_built.load(Ordering::SeqCst)
    }

    pub fn transcoder_alive(&self) -> bool {
        self.transcoder_alive.load(Ordering::SeqCst)
    }

    pub fn feed_running(&self) -> bool {
        self.feed_running.load(Ordering::SeqCst)
    }

    /// Simulate the transcoder process dying on its own.
    pub fn kill_transcoder(&self) {
        self.transcoder_alive.store(false, Ordering::SeqCst);
    }

    /// The sender handed to the most recently attached feed.
    pub fn sender(&self) -> Option<EventSender> {
        self.events.lock().unwrap().clone()
    }

    /// Push one event through the most recently attached feed.
    pub async fn emit(&self, event: DetectionEvent) {
        let sender = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("no feed attached");
        sender.send(event).await.expect("session consumer gone");
    }
}

pub struct MockTranscoder {
    controls: Arc<MockControls>,
    source_id: String,
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn start(&mut self) -> Result<()> {
        let c = &self.controls;
        c.transcoder_starts.fetch_add(1, Ordering::SeqCst);
        if c.transcode_panic.load(Ordering::SeqCst) {
            panic!("transcoder blew up");
        }
        if c.transcode_fail.load(Ordering::SeqCst) {
            return Err(SurfwatchError::LaunchFailure {
                source_id: self.source_id.clone(),
                message: "scripted failure".into(),
            });
        }
        c.transcoder_alive.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.controls.transcoder_alive()
    }

    async fn stop(&mut self) {
        let delay = self.controls.transcoder_stop_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.controls.transcoder_alive.store(false, Ordering::SeqCst);
    }
}

pub struct MockFeed {
    controls: Arc<MockControls>,
    source_id: String,
}

#[async_trait]
impl DetectionFeed for MockFeed {
    async fn start(&mut self, _stream_url: &str, events: EventSender) -> Result<()> {
        let c = &self.controls;
        c.feed_starts.fetch_add(1, Ordering::SeqCst);
        if c.feed_fail.load(Ordering::SeqCst) {
            return Err(SurfwatchError::AttachFailure {
                source_id: self.source_id.clone(),
                message: "scripted failure".into(),
            });
        }
        *c.events.lock().unwrap() = Some(events);
        c.feed_running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.controls.feed_running()
    }

    async fn stop(&mut self) {
        self.controls.feed_running.store(false, Ordering::SeqCst);
        *self.controls.events.lock().unwrap() = None;
    }
}

#[derive(Default, Clone)]
pub struct MockBackend {
    pub controls: Arc<MockControls>,
}

impl PipelineBackend for MockBackend {
    fn transcoder(&self, source: &SourceConfig, _relay: &RelayAddress) -> Box<dyn Transcoder> {
        self.controls.transcoders_built.fetch_add(1, Ordering::SeqCst);
        Box::new(MockTranscoder {
            controls: Arc::clone(&self.controls),
            source_id: source.id.clone(),
        })
    }

    fn detection_feed(&self, source: &SourceConfig) -> Box<dyn DetectionFeed> {
        Box::new(MockFeed {
            controls: Arc::clone(&self.controls),
            source_id: source.id.clone(),
        })
    }
}

pub fn source(id: &str) -> SourceConfig {
    SourceConfig {
        id: id.into(),
        display_name: format!("{id} cam"),
        location: "Test Beach".into(),
        source_url: format!("https://example.com/{id}.m3u8"),
    }
}

pub fn settings(health_interval: Duration) -> SessionSettings {
    SessionSettings {
        feed_grace: Duration::from_millis(10),
        health_interval,
        stop_timeout: Duration::from_secs(1),
        restart: RestartPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_factor: 2.0,
            max_backoff: Duration::from_secs(1),
        },
    }
}

pub fn registry(backend: &MockBackend, health_interval: Duration) -> SessionRegistry {
    registry_with_relay(backend, health_interval, &RelayConfig::default())
}

pub fn registry_with_relay(
    backend: &MockBackend,
    health_interval: Duration,
    relay: &RelayConfig,
) -> SessionRegistry {
    SessionRegistry::new(
        Arc::new(backend.clone()),
        Arc::new(LabelCounter::new("surfer")),
        settings(health_interval),
        relay,
    )
}

/// Poll `cond` every few milliseconds until it holds, failing after `limit`.
pub async fn wait_for<F>(limit: Duration, mut cond: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {limit:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
