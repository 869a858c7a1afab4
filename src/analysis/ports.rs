// src/analysis/ports.rs — Relay port allocation
//
// Numeric source ids serve on `base_port + id` so their relay address can
// be derived from the id alone. Everything else draws the lowest free port
// from a dedicated fallback range. A port is never shared: a collision is
// rejected instead of silently reusing the port.

use std::collections::HashMap;

use crate::infra::config::RelayConfig;
use crate::infra::errors::{Result, SurfwatchError};

use super::RelayAddress;

#[derive(Debug, Clone)]
pub struct PortAllocator {
    host: String,
    path: String,
    base_port: u16,
    fallback_start: u16,
    fallback_count: u16,
    assigned: HashMap<String, u16>,
}

impl PortAllocator {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            host: config.host.clone(),
            path: config.path.clone(),
            base_port: config.base_port,
            fallback_start: config.fallback_port_start,
            fallback_count: config.fallback_port_count,
            assigned: HashMap::new(),
        }
    }

    /// Port derived from a numeric id, if the id is numeric.
    fn derived_port(&self, source_id: &str) -> Option<Result<u16>> {
        if source_id.is_empty() || !source_id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let port = source_id
            .parse::<u32>()
            .ok()
            .and_then(|n| u16::try_from(u32::from(self.base_port) + n).ok());
        Some(port.ok_or_else(|| {
            SurfwatchError::Config(format!(
                "source id '{source_id}' maps outside the valid port range"
            ))
        }))
    }

    fn holder_of(&self, port: u16) -> Option<&str> {
        self.assigned
            .iter()
            .find(|(_, p)| **p == port)
            .map(|(id, _)| id.as_str())
    }

    /// Reserve a relay address for `source_id`. Idempotent for an id that
    /// already holds a port.
    pub fn allocate(&mut self, source_id: &str) -> Result<RelayAddress> {
        if let Some(port) = self.assigned.get(source_id) {
            return Ok(self.address(*port));
        }

        let port = match self.derived_port(source_id) {
            Some(derived) => {
                let port = derived?;
                if self.holder_of(port).is_some() {
                    return Err(SurfwatchError::PortConflict {
                        source_id: source_id.to_string(),
                        port,
                    });
                }
                port
            }
            None => (0..self.fallback_count)
                .filter_map(|offset| self.fallback_start.checked_add(offset))
                .find(|port| self.holder_of(*port).is_none())
                .ok_or_else(|| SurfwatchError::PortsExhausted {
                    source_id: source_id.to_string(),
                })?,
        };

        tracing::debug!("Relay port {} allocated to '{}'", port, source_id);
        self.assigned.insert(source_id.to_string(), port);
        Ok(self.address(port))
    }

    pub fn release(&mut self, source_id: &str) {
        if let Some(port) = self.assigned.remove(source_id) {
            tracing::debug!("Relay port {} released by '{}'", port, source_id);
        }
    }

    pub fn port_of(&self, source_id: &str) -> Option<u16> {
        self.assigned.get(source_id).copied()
    }

    pub fn allocated(&self) -> usize {
        self.assigned.len()
    }

    fn address(&self, port: u16) -> RelayAddress {
        RelayAddress {
            host: self.host.clone(),
            port,
            path: self.path.clone(),
        }
    }
}

/// Allocate every id in order on a fresh table. Used to preview the port
/// layout of a config before any session runs.
pub fn plan<'a>(
    config: &RelayConfig,
    source_ids: impl IntoIterator<Item = &'a str>,
) -> Vec<(String, Result<u16>)> {
    let mut ports = PortAllocator::new(config);
    source_ids
        .into_iter()
        .map(|id| (id.to_string(), ports.allocate(id).map(|a| a.port)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> RelayConfig {
        RelayConfig {
            host: "127.0.0.1".into(),
            base_port: 8550,
            fallback_port_start: 8600,
            fallback_port_count: 2,
            path: "/stream.mjpeg".into(),
        }
    }

    #[test]
    fn test_numeric_id_derives_port() {
        let mut ports = PortAllocator::new(&relay());
        let addr = ports.allocate("3").unwrap();
        assert_eq!(addr.port, 8553);
        assert_eq!(addr.url(), "http://127.0.0.1:8553/stream.mjpeg");
    }

    #[test]
    fn test_non_numeric_ids_get_distinct_ports() {
        let mut ports = PortAllocator::new(&relay());
        let a = ports.allocate("Windansea").unwrap();
        let b = ports.allocate("Long Beach").unwrap();
        assert_eq!(a.port, 8600);
        assert_eq!(b.port, 8601);
    }

    #[test]
    fn test_allocate_is_idempotent() {
        let mut ports = PortAllocator::new(&relay());
        let first = ports.allocate("Windansea").unwrap();
        let again = ports.allocate("Windansea").unwrap();
        assert_eq!(first, again);
        assert_eq!(ports.allocated(), 1);
    }

    #[test]
    fn test_fallback_range_exhaustion_is_rejected() {
        let mut ports = PortAllocator::new(&relay());
        ports.allocate("a").unwrap();
        ports.allocate("b").unwrap();
        let err = ports.allocate("c").unwrap_err();
        assert!(matches!(err, SurfwatchError::PortsExhausted { .. }));
    }

    #[test]
    fn test_numeric_collision_with_fallback_is_rejected() {
        let mut ports = PortAllocator::new(&relay());
        ports.allocate("Windansea").unwrap(); // 8600
        let err = ports.allocate("50").unwrap_err(); // 8550 + 50
        assert!(matches!(err, SurfwatchError::PortConflict { port: 8600, .. }));
    }

    #[test]
    fn test_release_frees_port() {
        let mut ports = PortAllocator::new(&relay());
        ports.allocate("a").unwrap();
        ports.allocate("b").unwrap();
        ports.release("a");
        assert_eq!(ports.port_of("a"), None);
        assert_eq!(ports.allocate("c").unwrap().port, 8600);
    }

    #[test]
    fn test_out_of_range_numeric_id() {
        let mut ports = PortAllocator::new(&relay());
        assert!(matches!(
            ports.allocate("99999"),
            Err(SurfwatchError::Config(_))
        ));
    }

    #[test]
    fn test_signed_or_mixed_ids_use_fallback() {
        let mut ports = PortAllocator::new(&relay());
        assert_eq!(ports.allocate("-1").unwrap().port, 8600);
        assert_eq!(ports.allocate("12a").unwrap().port, 8601);
    }

    #[test]
    fn test_plan_reports_per_id() {
        let planned = plan(&relay(), ["1", "x", "y", "z"]);
        assert_eq!(planned.len(), 4);
        assert_eq!(planned[0].1.as_ref().unwrap(), &8551);
        assert_eq!(planned[1].1.as_ref().unwrap(), &8600);
        assert!(planned[3].1.is_err());
    }
}
