//! Fake probes and runners for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::probe::{Dependency, ProbeOutcome, ReadinessProbe};
use crate::stage::{ExitIndicator, StageResult, StageRunner, StageSpec};

#[derive(Debug, Clone)]
enum Script {
    ReadyAfter(usize),
    NeverReady,
    AlwaysError(String),
}

/// A probe that answers from a per-dependency script and counts probes.
///
/// Dependencies without a script answer ready on the first probe.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    scripts: HashMap<String, Script>,
    counts: Mutex<HashMap<String, usize>>,
}

impl ScriptedProbe {
    /// Creates a probe where every dependency is immediately ready.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the named dependency answer not ready until the given probe,
    /// ready from then on.
    #[must_use]
    pub fn ready_after(mut self, name: impl Into<String>, probes: usize) -> Self {
        self.scripts.insert(name.into(), Script::ReadyAfter(probes));
        self
    }

    /// Makes the named dependency answer not ready forever.
    #[must_use]
    pub fn never_ready(mut self, name: impl Into<String>) -> Self {
        self.scripts.insert(name.into(), Script::NeverReady);
        self
    }

    /// Makes every probe of the named dependency fail with the detail.
    #[must_use]
    pub fn always_error(mut self, name: impl Into<String>, detail: impl Into<String>) -> Self {
        self.scripts
            .insert(name.into(), Script::AlwaysError(detail.into()));
        self
    }

    /// How many times the named dependency was probed.
    #[must_use]
    pub fn probe_count(&self, name: &str) -> usize {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }

    /// Total probes across all dependencies.
    #[must_use]
    pub fn total_probes(&self) -> usize {
        self.counts.lock().values().sum()
    }
}

#[async_trait]
impl ReadinessProbe for ScriptedProbe {
    async fn check(&self, dependency: &Dependency) -> ProbeOutcome {
        let count = {
            let mut counts = self.counts.lock();
            let count = counts.entry(dependency.name.clone()).or_insert(0);
            *count += 1;
            *count
        };

        match self.scripts.get(&dependency.name) {
            None => ProbeOutcome::Ready,
            Some(Script::ReadyAfter(probes)) => {
                if count >= *probes {
                    ProbeOutcome::Ready
                } else {
                    ProbeOutcome::NotReady
                }
            }
            Some(Script::NeverReady) => ProbeOutcome::NotReady,
            Some(Script::AlwaysError(detail)) => ProbeOutcome::Error(detail.clone()),
        }
    }
}

/// A probe that gives every dependency the same answer and counts probes.
#[derive(Debug)]
pub struct StaticProbe {
    outcome: ProbeOutcome,
    count: Mutex<usize>,
}

impl StaticProbe {
    /// Creates a probe that always answers ready.
    #[must_use]
    pub fn ready() -> Self {
        Self::with_outcome(ProbeOutcome::Ready)
    }

    /// Creates a probe that always answers not ready.
    #[must_use]
    pub fn not_ready() -> Self {
        Self::with_outcome(ProbeOutcome::NotReady)
    }

    /// Creates a probe with a fixed outcome.
    #[must_use]
    pub fn with_outcome(outcome: ProbeOutcome) -> Self {
        Self {
            outcome,
            count: Mutex::new(0),
        }
    }

    /// Total probes performed.
    #[must_use]
    pub fn count(&self) -> usize {
        *self.count.lock()
    }
}

#[async_trait]
impl ReadinessProbe for StaticProbe {
    async fn check(&self, _dependency: &Dependency) -> ProbeOutcome {
        *self.count.lock() += 1;
        self.outcome.clone()
    }
}

/// A runner that records invocation order and returns scripted results.
///
/// Stages without a scripted failure succeed with empty output.
#[derive(Debug, Default)]
pub struct FakeStageRunner {
    failures: HashMap<String, (ExitIndicator, String)>,
    invocations: Mutex<Vec<String>>,
}

impl FakeStageRunner {
    /// Creates a runner where every stage succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the named stage fail with the given exit indicator.
    #[must_use]
    pub fn failing(self, stage: impl Into<String>, exit: ExitIndicator) -> Self {
        self.failing_with_stderr(stage, exit, "simulated failure")
    }

    /// Makes the named stage fail with the given exit and stderr text.
    #[must_use]
    pub fn failing_with_stderr(
        mut self,
        stage: impl Into<String>,
        exit: ExitIndicator,
        stderr: impl Into<String>,
    ) -> Self {
        self.failures.insert(stage.into(), (exit, stderr.into()));
        self
    }

    /// Invoked stage names, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }

    /// How many times the named stage was invoked.
    #[must_use]
    pub fn invocation_count(&self, stage: &str) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|name| name.as_str() == stage)
            .count()
    }
}

#[async_trait]
impl StageRunner for FakeStageRunner {
    async fn run(&self, spec: &StageSpec) -> StageResult {
        self.invocations.lock().push(spec.name.clone());
        match self.failures.get(&spec.name) {
            Some((exit, stderr)) => {
                StageResult::failed(&spec.name, *exit, "", stderr.as_str())
            }
            None => StageResult::ok(&spec.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dep(name: &str) -> Dependency {
        Dependency::new(name, "localhost").with_port(5432)
    }

    #[tokio::test]
    async fn test_scripted_probe_defaults_to_ready() {
        let probe = ScriptedProbe::new();
        assert_eq!(probe.check(&dep("source")).await, ProbeOutcome::Ready);
        assert_eq!(probe.probe_count("source"), 1);
        assert_eq!(probe.total_probes(), 1);
    }

    #[tokio::test]
    async fn test_scripted_probe_ready_after() {
        let probe = ScriptedProbe::new().ready_after("dest", 2);
        assert_eq!(probe.check(&dep("dest")).await, ProbeOutcome::NotReady);
        assert_eq!(probe.check(&dep("dest")).await, ProbeOutcome::Ready);
        assert_eq!(probe.check(&dep("dest")).await, ProbeOutcome::Ready);
        assert_eq!(probe.probe_count("dest"), 3);
    }

    #[tokio::test]
    async fn test_scripted_probe_error_detail() {
        let probe = ScriptedProbe::new().always_error("dest", "dns failure");
        let outcome = probe.check(&dep("dest")).await;
        assert_eq!(outcome.detail(), Some("dns failure"));
    }

    #[tokio::test]
    async fn test_static_probe_counts() {
        let probe = StaticProbe::not_ready();
        probe.check(&dep("a")).await;
        probe.check(&dep("b")).await;
        assert_eq!(probe.count(), 2);
    }

    #[tokio::test]
    async fn test_fake_runner_records_order() {
        let runner = FakeStageRunner::new();
        runner.run(&StageSpec::new("extract", "pg_dump")).await;
        runner.run(&StageSpec::new("load", "psql")).await;

        assert_eq!(runner.invocations(), vec!["extract", "load"]);
        assert_eq!(runner.invocation_count("extract"), 1);
        assert_eq!(runner.invocation_count("verify"), 0);
    }

    #[tokio::test]
    async fn test_fake_runner_scripted_failure() {
        let runner = FakeStageRunner::new().failing("load", ExitIndicator::Code(2));

        let ok = runner.run(&StageSpec::new("extract", "pg_dump")).await;
        assert!(ok.succeeded);

        let failed = runner.run(&StageSpec::new("load", "psql")).await;
        assert!(!failed.succeeded);
        assert_eq!(failed.exit, ExitIndicator::Code(2));
        assert_eq!(failed.stderr, "simulated failure");
    }
}
