// src/infra/paths.rs — Config path resolution
//
// SURFWATCH_HOME overrides everything. When unset, config lives in
// ~/.surfwatch/ to match the deployment docs.

use std::path::PathBuf;

/// Returns the SURFWATCH_HOME override, if set.
fn surfwatch_home() -> Option<PathBuf> {
    std::env::var_os("SURFWATCH_HOME").map(PathBuf::from)
}

/// Home directory, if the platform can tell us one.
pub fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Configuration directory: $SURFWATCH_HOME/ or ~/.surfwatch/
///
/// Falls back to the working directory when no home directory exists
/// (containers running as a bare uid).
pub fn config_dir() -> PathBuf {
    if let Some(home) = surfwatch_home() {
        return home;
    }
    dirs_home()
        .map(|h| h.join(".surfwatch"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}
