// src/analysis/mod.rs — Live stream analysis: supervisors, sessions, registry
//
// Per source: a transcoder turns the remote stream into a local MJPEG relay,
// a detection feed watches the relay and emits per-frame events, and a
// health monitor restarts either one when it dies.

pub mod detection;
pub mod monitor;
pub mod normalizer;
pub mod ports;
pub mod process;
pub mod registry;
pub mod session;
pub mod transcode;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::infra::config::{Config, DetectorConfig, SourceConfig, TranscodeConfig};
use crate::infra::errors::Result;

pub use normalizer::{DetectionEvent, EventDecoder, LabelCounter};
pub use registry::{SessionRegistry, StartOutcome};
pub use session::{Session, SessionSettings};

/// Channel a detection feed pushes raw events into.
pub type EventSender = mpsc::Sender<DetectionEvent>;

/// Where a session's transcoded stream is served locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAddress {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RelayAddress {
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Session lifecycle. `Error` and `Stopped` are terminal for the
/// supervisors; only an explicit stop leaves `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Starting,
    TranscodeUp,
    Online,
    TranscodeError,
    FeedError,
    Error,
    Stopped,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Starting => "Starting",
            SessionStatus::TranscodeUp => "TranscodeUp",
            SessionStatus::Online => "Online",
            SessionStatus::TranscodeError => "TranscodeError",
            SessionStatus::FeedError => "FeedError",
            SessionStatus::Error => "Error",
            SessionStatus::Stopped => "Stopped",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SessionStatus::TranscodeError | SessionStatus::FeedError | SessionStatus::Error
        )
    }

    /// No supervisor activity happens in these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Error | SessionStatus::Stopped)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Latest normalized detection for a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionResult {
    pub count: u32,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Read-only view of a session handed to callers outside the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub source_id: String,
    pub status: SessionStatus,
    pub result: DetectionResult,
    pub relay_url: String,
}

/// Keeps one transcoding process alive for a source.
#[async_trait]
pub trait Transcoder: Send {
    /// Launch the process. Failure is reported, never retried here.
    async fn start(&mut self) -> Result<()>;

    /// Non-blocking liveness probe.
    fn is_alive(&mut self) -> bool;

    /// Terminate gracefully, forcing after a bounded wait.
    async fn stop(&mut self);
}

/// Attaches a detection pipeline to a relay and forwards its events.
#[async_trait]
pub trait DetectionFeed: Send {
    /// Start the pipeline against `stream_url`. The pipeline's run loop
    /// lives on its own task; events go to `events` until it halts.
    async fn start(&mut self, stream_url: &str, events: EventSender) -> Result<()>;

    /// Liveness of the run loop, independent of the transcoder's.
    fn is_running(&mut self) -> bool;

    /// Halt the run loop.
    async fn stop(&mut self);
}

/// Builds the supervisors for each new session.
pub trait PipelineBackend: Send + Sync {
    fn transcoder(&self, source: &SourceConfig, relay: &RelayAddress) -> Box<dyn Transcoder>;
    fn detection_feed(&self, source: &SourceConfig) -> Box<dyn DetectionFeed>;
}

/// Production backend: an external transcoder process plus an external
/// detector command per session.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    transcode: TranscodeConfig,
    detector: DetectorConfig,
    max_fps: u32,
}

impl ProcessBackend {
    pub fn from_config(config: &Config) -> Self {
        Self {
            transcode: config.transcode.clone(),
            detector: config.detector.clone(),
            max_fps: config.analysis.max_fps,
        }
    }
}

impl PipelineBackend for ProcessBackend {
    fn transcoder(&self, source: &SourceConfig, relay: &RelayAddress) -> Box<dyn Transcoder> {
        Box::new(transcode::FfmpegTranscoder::new(
            source,
            relay,
            &self.transcode,
            self.max_fps,
        ))
    }

    fn detection_feed(&self, source: &SourceConfig) -> Box<dyn DetectionFeed> {
        Box::new(detection::CommandFeed::new(
            source,
            &self.detector,
            self.max_fps,
        ))
    }
}
