// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::infra::errors::SurfwatchError;
use crate::infra::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub restart: RestartConfig,

    /// Camera sources. An absent key keeps the built-in list; an explicit
    /// empty list disables analysis entirely.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            analysis: AnalysisConfig::default(),
            relay: RelayConfig::default(),
            transcode: TranscodeConfig::default(),
            detector: DetectorConfig::default(),
            restart: RestartConfig::default(),
            sources: default_sources(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            cors_origins: vec!["http://localhost:3000".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Class label counted by the normalizer (case-insensitive).
    pub target_label: String,
    pub max_fps: u32,
    pub health_check_interval_secs: u64,
    /// Delay between the transcoder coming up and the feed attaching.
    pub feed_grace_secs: u64,
    /// Upper bound on how long a stop waits for supervisory tasks.
    pub stop_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            target_label: "surfer".into(),
            max_fps: 2,
            health_check_interval_secs: 5,
            feed_grace_secs: 5,
            stop_timeout_secs: 5,
        }
    }
}

impl AnalysisConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn feed_grace(&self) -> Duration {
        Duration::from_secs(self.feed_grace_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub host: String,
    /// Numeric source ids serve on `base_port + id`.
    pub base_port: u16,
    /// Non-numeric source ids draw from `[fallback_port_start, +count)`.
    pub fallback_port_start: u16,
    pub fallback_port_count: u16,
    pub path: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            base_port: 8550,
            fallback_port_start: 8600,
            fallback_port_count: 50,
            path: "/stream.mjpeg".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeConfig {
    pub program: String,
    pub resolution: String,
    /// MJPEG quality scale, 2 (best) to 31.
    pub quality: u8,
    /// Seconds without a client before the transcoder exits on its own.
    pub timeout_secs: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
            resolution: "1280x720".into(),
            quality: 2,
            timeout_secs: 10,
        }
    }
}

/// External detection pipeline. `args` may reference `{stream_url}` and
/// `{max_fps}`; the process must print one JSON document per frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            command: "surfwatch-detect".into(),
            args: vec![
                "--video".into(),
                "{stream_url}".into(),
                "--max-fps".into(),
                "{max_fps}".into(),
            ],
            env: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_factor: f64,
    pub max_backoff_ms: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 2_000,
            backoff_factor: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

/// One camera feed, immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub location: String,
    pub source_url: String,
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            id: "Windansea".into(),
            display_name: "Windansea - La Jolla".into(),
            location: "La Jolla, CA".into(),
            source_url: "https://windansea.b-cdn.net/sunba/windansea/chunklist.m3u8".into(),
        },
        SourceConfig {
            id: "Long Beach".into(),
            display_name: "Long Beach - New York".into(),
            location: "Long Beach, NY".into(),
            source_url: "https://cdn3.wowza.com/5/dUdmdXlNV2haM01q/New_York/longbeach.stream/chunklist.m3u8".into(),
        },
        SourceConfig {
            id: "Emerald Isle".into(),
            display_name: "Emerald Isle - North Carolina".into(),
            location: "Bogue Banks Island, NC".into(),
            source_url: "https://emeraldislebeachwora.b-cdn.net/North-Carolina/emeraldislebeachwora.stream/chunklist.m3u8".into(),
        },
    ]
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject configurations the supervisors could never run with.
    pub fn validate(&self) -> Result<(), SurfwatchError> {
        let bad = |msg: String| Err(SurfwatchError::Config(msg));

        if self.analysis.max_fps == 0 {
            return bad("analysis.max_fps must be at least 1".into());
        }
        if self.analysis.health_check_interval_secs == 0 {
            return bad("analysis.health_check_interval_secs must be positive".into());
        }
        if self.analysis.stop_timeout_secs == 0 {
            return bad("analysis.stop_timeout_secs must be positive".into());
        }
        if self.analysis.target_label.trim().is_empty() {
            return bad("analysis.target_label cannot be empty".into());
        }
        if !(2..=31).contains(&self.transcode.quality) {
            return bad(format!(
                "transcode.quality must be within 2..=31, got {}",
                self.transcode.quality
            ));
        }
        if self.transcode.timeout_secs == 0 {
            return bad("transcode.timeout_secs must be positive".into());
        }
        if self.relay.base_port < 1024 {
            return bad(format!(
                "relay.base_port {} is in the reserved range",
                self.relay.base_port
            ));
        }
        if self.restart.backoff_factor < 1.0 {
            return bad("restart.backoff_factor must be >= 1.0".into());
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return bad("source id cannot be empty".into());
            }
            if !seen.insert(source.id.as_str()) {
                return bad(format!("duplicate source id '{}'", source.id));
            }
        }
        Ok(())
    }
}

/// Read-only `id → SourceConfig` lookup handed to request handlers.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: BTreeMap<String, SourceConfig>,
}

impl SourceCatalog {
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sources.iter().cloned())
    }

    pub fn new(sources: impl IntoIterator<Item = SourceConfig>) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.get(id)
    }

    /// Sources in id order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
