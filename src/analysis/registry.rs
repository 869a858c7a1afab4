// src/analysis/registry.rs — Process-wide table of live sessions
//
// Lifecycle bookkeeping (create, begin stop, finish stop) is serialized by
// one async mutex that also owns the relay port table. The lock is never held
// while a session winds down, so a slow stop only holds up its own id. Reads
// go through a separate map lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::infra::config::{RelayConfig, SourceConfig};
use crate::infra::errors::{Result, SurfwatchError};

use super::ports::PortAllocator;
use super::session::{Session, SessionSettings};
use super::{DetectionResult, EventDecoder, PipelineBackend, SessionSnapshot};

/// Last published result per source, written by sessions and cleared when
/// their session is stopped.
#[derive(Debug, Clone, Default)]
pub struct ResultBoard {
    results: Arc<RwLock<HashMap<String, DetectionResult>>>,
}

impl ResultBoard {
    pub fn publish(&self, source_id: &str, result: DetectionResult) {
        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source_id.to_string(), result);
    }

    pub fn get(&self, source_id: &str) -> Option<DetectionResult> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_id)
            .copied()
    }

    pub fn remove(&self, source_id: &str) {
        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(source_id);
    }
}

/// Result of `start_or_get`: the snapshot plus whether this call created
/// the session.
#[derive(Debug, Clone, PartialEq)]
pub struct StartOutcome {
    pub snapshot: SessionSnapshot,
    pub created: bool,
}

/// State guarded by the lifecycle lock.
#[derive(Debug)]
struct Lifecycle {
    ports: PortAllocator,
    /// Ids whose session is winding down; their port stays reserved.
    stopping: HashSet<String>,
}

pub struct SessionRegistry {
    backend: Arc<dyn PipelineBackend>,
    decoder: Arc<dyn EventDecoder>,
    settings: SessionSettings,
    lifecycle: Mutex<Lifecycle>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    board: ResultBoard,
}

impl SessionRegistry {
    pub fn new(
        backend: Arc<dyn PipelineBackend>,
        decoder: Arc<dyn EventDecoder>,
        settings: SessionSettings,
        relay: &RelayConfig,
    ) -> Self {
        Self {
            backend,
            decoder,
            settings,
            lifecycle: Mutex::new(Lifecycle {
                ports: PortAllocator::new(relay),
                stopping: HashSet::new(),
            }),
            sessions: RwLock::new(HashMap::new()),
            board: ResultBoard::default(),
        }
    }

    fn session(&self, source_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_id)
            .cloned()
    }

    /// Return the live session's snapshot, creating and launching one if
    /// none exists. Never waits on the supervisors; a new session reports
    /// `Starting`. Concurrent calls for one id create exactly one session.
    /// Fails with `Stopping` while a previous session for the id winds down.
    pub async fn start_or_get(&self, source: &SourceConfig) -> Result<StartOutcome> {
        if let Some(existing) = self.session(&source.id) {
            return Ok(StartOutcome {
                snapshot: existing.snapshot(),
                created: false,
            });
        }

        let mut lifecycle = self.lifecycle.lock().await;
        // Another caller may have created it while we waited for the lock.
        if let Some(existing) = self.session(&source.id) {
            return Ok(StartOutcome {
                snapshot: existing.snapshot(),
                created: false,
            });
        }
        if lifecycle.stopping.contains(&source.id) {
            return Err(SurfwatchError::Stopping {
                source_id: source.id.clone(),
            });
        }

        let relay = lifecycle.ports.allocate(&source.id)?;
        let session = Session::new(
            source.clone(),
            relay,
            self.settings.clone(),
            Arc::clone(&self.decoder),
            self.board.clone(),
            self.backend.as_ref(),
        );
        let snapshot = session.snapshot();

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.id.clone(), Arc::clone(&session));
        session.launch();

        tracing::info!(
            "Session created for '{}' (relay {})",
            source.id,
            snapshot.relay_url
        );
        Ok(StartOutcome {
            snapshot,
            created: true,
        })
    }

    /// Stop the session for `source_id` and remove every trace of it.
    /// Other ids stay startable and stoppable while this one winds down.
    pub async fn stop(&self, source_id: &str) -> Result<()> {
        let session = {
            let mut lifecycle = self.lifecycle.lock().await;
            let session = self
                .sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(source_id)
                .ok_or_else(|| SurfwatchError::NotFound {
                    source_id: source_id.to_string(),
                })?;
            lifecycle.stopping.insert(source_id.to_string());
            session
        };

        session.stop().await;

        let mut lifecycle = self.lifecycle.lock().await;
        self.board.remove(source_id);
        lifecycle.ports.release(source_id);
        lifecycle.stopping.remove(source_id);
        Ok(())
    }

    pub fn get(&self, source_id: &str) -> Option<SessionSnapshot> {
        self.session(source_id).map(|s| s.snapshot())
    }

    /// Last result a session published, if it is still active.
    pub fn latest_result(&self, source_id: &str) -> Option<DetectionResult> {
        self.board.get(source_id)
    }

    pub fn relay_url(&self, source_id: &str) -> Option<String> {
        self.session(source_id).map(|s| s.relay().url())
    }

    /// Active source ids, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stop every active session concurrently. Used on process shutdown.
    pub async fn shutdown(&self) {
        let ids = self.active_ids();
        let results = join_all(ids.iter().map(|id| self.stop(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                tracing::debug!("Shutdown skipped '{}': {}", id, e);
            }
        }
    }
}
