//! Bounded-retry readiness gate.
//!
//! The gate holds the pipeline at its starting line until every declared
//! dependency answers ready, probing under a fixed-interval retry policy.
//! Probes within one attempt round run concurrently; a dependency that has
//! answered ready is never probed again in the same invocation.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{GateFailure, UnreadyDependency};
use crate::probe::{Dependency, ProbeOutcome, ReadinessProbe};

/// Default attempt budget, matching the original wait loop.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default fixed delay between attempt rounds.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Bounded fixed-interval retry policy for the readiness gate.
///
/// The delay is constant between rounds: readiness waits are about an
/// external service coming up, not about load shedding, so there is no
/// exponential backoff or jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt rounds before giving up. Must be at least 1.
    pub max_attempts: u32,
    /// Fixed delay between rounds.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Sets the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay between rounds.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// How a successful gate invocation went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    /// Attempt rounds used. Zero when no dependencies were declared.
    pub attempts: u32,
    /// For each dependency, the attempt on which it first answered ready.
    pub ready_on: Vec<(String, u32)>,
}

impl GateReport {
    /// The attempt on which the named dependency became ready, if it did.
    #[must_use]
    pub fn ready_attempt(&self, name: &str) -> Option<u32> {
        self.ready_on
            .iter()
            .find(|(dep, _)| dep == name)
            .map(|(_, attempt)| *attempt)
    }
}

/// Applies a [`ReadinessProbe`] to a set of dependencies under a
/// [`RetryPolicy`], succeeding only once all are ready within budget.
#[derive(Debug)]
pub struct ReadinessGate {
    probe: Arc<dyn ReadinessProbe>,
    shutdown: CancellationToken,
}

impl ReadinessGate {
    /// Creates a gate over the given probe.
    #[must_use]
    pub fn new(probe: Arc<dyn ReadinessProbe>) -> Self {
        Self {
            probe,
            shutdown: CancellationToken::new(),
        }
    }

    /// Attaches a cancellation token honored during probe rounds and
    /// inter-attempt sleeps.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Waits until every dependency is ready.
    ///
    /// Probes all still-pending dependencies concurrently each round, then
    /// sleeps the policy delay before the next round. An empty dependency
    /// list succeeds immediately with zero probes.
    ///
    /// # Errors
    ///
    /// [`GateFailure::Unready`] when the attempt budget is exhausted with
    /// any dependency still unready, [`GateFailure::Cancelled`] when the
    /// shutdown token fires first.
    pub async fn await_ready(
        &self,
        dependencies: &[Dependency],
        policy: &RetryPolicy,
    ) -> Result<GateReport, GateFailure> {
        if dependencies.is_empty() {
            debug!("no dependencies declared, gate passes");
            return Ok(GateReport::default());
        }
        if self.shutdown.is_cancelled() {
            return Err(GateFailure::Cancelled);
        }

        let max_attempts = policy.max_attempts.max(1);
        let mut pending: Vec<&Dependency> = dependencies.iter().collect();
        let mut ready_on: Vec<(String, u32)> = Vec::with_capacity(dependencies.len());
        let mut last_round: Vec<(&Dependency, ProbeOutcome)> = Vec::new();

        for attempt in 1..=max_attempts {
            let round = join_all(pending.iter().map(|dep| {
                let dep = *dep;
                async move { (dep, self.probe.check(dep).await) }
            }));

            let results = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(GateFailure::Cancelled),
                results = round => results,
            };

            let mut still_unready = Vec::new();
            for (dep, outcome) in results {
                if outcome.is_ready() {
                    debug!(dependency = %dep.name, attempt, "dependency ready");
                    ready_on.push((dep.name.clone(), attempt));
                } else {
                    debug!(
                        dependency = %dep.name,
                        attempt,
                        outcome = %outcome,
                        "dependency not ready"
                    );
                    still_unready.push((dep, outcome));
                }
            }

            if still_unready.is_empty() {
                info!(attempts = attempt, "all dependencies ready");
                return Ok(GateReport {
                    attempts: attempt,
                    ready_on,
                });
            }

            pending = still_unready.iter().map(|(dep, _)| *dep).collect();
            last_round = still_unready;

            if attempt < max_attempts {
                debug!(
                    attempt,
                    pending = pending.len(),
                    delay = ?policy.delay,
                    "waiting before next readiness attempt"
                );
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return Err(GateFailure::Cancelled),
                    () = sleep(policy.delay) => {}
                }
            }
        }

        let unready: Vec<UnreadyDependency> = last_round
            .into_iter()
            .map(|(dep, outcome)| {
                UnreadyDependency::new(&dep.name, outcome.detail().map(String::from))
            })
            .collect();
        warn!(
            attempts = max_attempts,
            unready = unready.len(),
            "readiness budget exhausted"
        );
        Err(GateFailure::unready(max_attempts, unready))
    }
}
