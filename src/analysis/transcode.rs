// src/analysis/transcode.rs — External transcoder (HLS → local MJPEG relay)

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::infra::config::{SourceConfig, TranscodeConfig};
use crate::infra::errors::{Result, SurfwatchError};

use super::{process, RelayAddress, Transcoder};

/// How long a stopping transcoder gets to exit before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Runs one `ffmpeg` process that reads the source stream and serves it as
/// MJPEG on the session's relay address.
pub struct FfmpegTranscoder {
    source_id: String,
    program: String,
    args: Vec<String>,
    process: Option<Child>,
}

impl FfmpegTranscoder {
    pub fn new(
        source: &SourceConfig,
        relay: &RelayAddress,
        config: &TranscodeConfig,
        max_fps: u32,
    ) -> Self {
        Self {
            source_id: source.id.clone(),
            program: config.program.clone(),
            args: transcode_args(&source.source_url, &relay.url(), config, max_fps),
            process: None,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Fixed transcoder invocation: native-rate read, bounded fps/size/quality,
/// and a listen timeout so an unwatched relay exits on its own.
pub fn transcode_args(
    source_url: &str,
    relay_url: &str,
    config: &TranscodeConfig,
    max_fps: u32,
) -> Vec<String> {
    [
        "-re",
        "-i",
        source_url,
        "-f",
        "mjpeg",
        "-r",
        &max_fps.to_string(),
        "-s",
        &config.resolution,
        "-q:v",
        &config.quality.to_string(),
        "-listen",
        "1",
        "-timeout",
        &config.timeout_secs.to_string(),
        "-analyzeduration",
        "1000000",
        "-probesize",
        "1000000",
        "-y",
        relay_url,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn start(&mut self) -> Result<()> {
        // A previous process that is still around is reclaimed first.
        if let Some(mut old) = self.process.take() {
            process::terminate(&mut old, STOP_GRACE).await;
        }

        tracing::info!("Starting transcoder for '{}'", self.source_id);
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = spawned.map_err(|e| SurfwatchError::LaunchFailure {
            source_id: self.source_id.clone(),
            message: format!("{}: {e}", self.program),
        })?;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(SurfwatchError::LaunchFailure {
                source_id: self.source_id.clone(),
                message: format!("exited immediately with {status}"),
            });
        }

        self.process = Some(child);
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.process.as_mut().is_some_and(process::is_running)
    }

    async fn stop(&mut self) {
        if let Some(mut child) = self.process.take() {
            tracing::info!("Stopping transcoder for '{}'", self.source_id);
            process::terminate(&mut child, STOP_GRACE).await;
        }
    }
}
