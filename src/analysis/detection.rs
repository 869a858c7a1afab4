// src/analysis/detection.rs — External detection pipeline (stdout, one JSON per frame)

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::infra::config::{DetectorConfig, SourceConfig};
use crate::infra::errors::{Result, SurfwatchError};

use super::{process, DetectionEvent, DetectionFeed, EventSender};

const STOP_GRACE: Duration = Duration::from_secs(5);

/// Runs the configured detector command against the relay. The command
/// must print one JSON document per processed frame on stdout; the
/// process's lifetime is the pipeline's run loop.
pub struct CommandFeed {
    source_id: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    max_fps: u32,
    process: Option<Child>,
    reader: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl CommandFeed {
    pub fn new(source: &SourceConfig, config: &DetectorConfig, max_fps: u32) -> Self {
        Self {
            source_id: source.id.clone(),
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            max_fps,
            process: None,
            reader: None,
            cancel: CancellationToken::new(),
        }
    }

    async fn halt(&mut self) {
        self.cancel.cancel();
        if let Some(mut child) = self.process.take() {
            process::terminate(&mut child, STOP_GRACE).await;
        }
        if let Some(reader) = self.reader.take() {
            // The reader ends on cancel or EOF; either is imminent now.
            let _ = reader.await;
        }
    }
}

/// Substitute `{stream_url}` and `{max_fps}` in the configured arguments.
pub fn detector_args(args: &[String], stream_url: &str, max_fps: u32) -> Vec<String> {
    let fps = max_fps.to_string();
    args.iter()
        .map(|a| a.replace("{stream_url}", stream_url).replace("{max_fps}", &fps))
        .collect()
}

/// Parse one line of detector output. Lines that are not JSON are still
/// one frame's output; they pass through as a string and count as zero.
pub fn parse_event_line(line: &str) -> Option<DetectionEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(line.to_string())),
    }
}

/// Forward detector output to `events` until EOF, cancellation, or the
/// receiving session going away.
pub async fn pump_events<R>(
    source_id: String,
    output: R,
    events: EventSender,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(output).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let Some(event) = parse_event_line(&line) else {
                    continue;
                };
                if events.send(event).await.is_err() {
                    tracing::debug!("Session for '{}' gone; dropping detections", source_id);
                    break;
                }
            }
            Ok(None) => {
                tracing::info!("Detection feed for '{}' reached end of output", source_id);
                break;
            }
            Err(e) => {
                tracing::warn!("Detection feed for '{}' read error: {}", source_id, e);
                break;
            }
        }
    }
}

#[async_trait]
impl DetectionFeed for CommandFeed {
    async fn start(&mut self, stream_url: &str, events: EventSender) -> Result<()> {
        self.halt().await;
        self.cancel = CancellationToken::new();

        tracing::info!(
            "Attaching detection feed for '{}' to {}",
            self.source_id,
            stream_url
        );
        let attach_err = |message: String| SurfwatchError::AttachFailure {
            source_id: self.source_id.clone(),
            message,
        };

        let mut child = Command::new(&self.command)
            .args(detector_args(&self.args, stream_url, self.max_fps))
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| attach_err(format!("{}: {e}", self.command)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| attach_err("failed to capture stdout".into()))?;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(attach_err(format!("exited immediately with {status}")));
        }

        self.reader = Some(tokio::spawn(pump_events(
            self.source_id.clone(),
            stdout,
            events,
            self.cancel.clone(),
        )));
        self.process = Some(child);
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        let reading = self.reader.as_ref().is_some_and(|r| !r.is_finished());
        reading && self.process.as_mut().is_some_and(process::is_running)
    }

    async fn stop(&mut self) {
        if self.process.is_some() {
            tracing::info!("Stopping detection feed for '{}'", self.source_id);
        }
        self.halt().await;
    }
}
