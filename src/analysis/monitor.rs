// src/analysis/monitor.rs — Per-session health checks with bounded restarts
//
// One monitor per session, one check at a time. Each check probes the
// transcoder, restarting it if dead, then probes the feed the same way.
// Restarts back off exponentially; a supervisor that keeps failing past
// `max_attempts` parks the session in `Error`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::infra::config::RestartConfig;

use super::session::Session;

/// How restarts of a single supervisor are paced and bounded.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from_config(&RestartConfig::default())
    }
}

impl RestartPolicy {
    pub fn from_config(config: &RestartConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            backoff_factor: config.backoff_factor,
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Minimum spacing after the `attempt`-th restart (1-indexed) before the
    /// next one may run.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_backoff.as_millis() as f64 * self.backoff_factor.powi(exp);
        let capped_ms = base_ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Attempt,
    /// Too soon after the previous attempt.
    Backoff,
    GiveUp,
}

/// Restart bookkeeping for one supervisor. Attempts accumulate while the
/// supervisor stays down and reset once a check finds it healthy.
#[derive(Debug, Default, Clone)]
pub struct RestartTracker {
    attempts: u32,
    last_attempt: Option<Instant>,
}

impl RestartTracker {
    pub fn decide(&self, policy: &RestartPolicy, now: Instant) -> RestartDecision {
        if self.attempts >= policy.max_attempts {
            return RestartDecision::GiveUp;
        }
        match self.last_attempt {
            Some(last) if now.duration_since(last) < policy.backoff_for(self.attempts) => {
                RestartDecision::Backoff
            }
            _ => RestartDecision::Attempt,
        }
    }

    pub fn record_attempt(&mut self, now: Instant) {
        self.attempts += 1;
        self.last_attempt = Some(now);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Continue,
    Halt,
}

pub struct HealthMonitor {
    session: Arc<Session>,
    transcoder: RestartTracker,
    feed: RestartTracker,
}

impl HealthMonitor {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            transcoder: RestartTracker::default(),
            feed: RestartTracker::default(),
        }
    }

    /// Check on a fixed interval until the session stops or parks in a
    /// terminal state.
    pub async fn run(mut self) {
        let interval = self.session.settings().health_interval;
        let cancel = self.session.cancellation();
        tracing::debug!(
            "Health monitor for '{}' started ({:?} interval)",
            self.session.source_id(),
            interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if self.check().await == CheckOutcome::Halt {
                break;
            }
        }

        tracing::debug!(
            "Health monitor for '{}' exiting",
            self.session.source_id()
        );
    }

    /// One health check. The feed is only looked at once the transcoder
    /// it reads from is up.
    pub async fn check(&mut self) -> CheckOutcome {
        if self.session.is_stopping() || self.session.status().is_terminal() {
            return CheckOutcome::Halt;
        }
        let policy = self.session.settings().restart.clone();

        if self.session.transcoder_alive().await {
            self.transcoder.reset();
        } else {
            let now = Instant::now();
            match self.transcoder.decide(&policy, now) {
                RestartDecision::GiveUp => {
                    self.session
                        .give_up("transcoder", self.transcoder.attempts());
                    return CheckOutcome::Halt;
                }
                RestartDecision::Backoff => return CheckOutcome::Continue,
                RestartDecision::Attempt => {
                    self.transcoder.record_attempt(now);
                    if !self.session.restart_transcoder().await {
                        return CheckOutcome::Continue;
                    }
                }
            }
        }

        if self.session.feed_running().await {
            self.feed.reset();
        } else {
            let now = Instant::now();
            match self.feed.decide(&policy, now) {
                RestartDecision::GiveUp => {
                    self.session
                        .give_up("detection feed", self.feed.attempts());
                    return CheckOutcome::Halt;
                }
                RestartDecision::Backoff => {}
                RestartDecision::Attempt => {
                    self.feed.record_attempt(now);
                    self.session.restart_feed().await;
                }
            }
        }

        CheckOutcome::Continue
    }
}
