// src/api/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `?source=<id>` on every per-source route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceQuery {
    #[serde(default)]
    pub source: Option<String>,
}

/// Response for `GET /api/analysis-status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatus {
    pub source_id: String,
    pub display_name: String,
    pub count: u32,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response for `DELETE /api/analysis`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub message: String,
}

/// One entry of `GET /api/sources`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub id: String,
    pub display_name: String,
    pub location: String,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Response for `GET /api/health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
