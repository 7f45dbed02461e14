//! Run data and the explicit run state machine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gate::{GateReport, RetryPolicy};
use crate::probe::Dependency;
use crate::stage::{StageResult, StageSpec};

/// The linear state machine a run moves through.
///
/// `StageRunning` carries the stage name, so the same five variants cover a
/// run of N ordered stages; the two-stage core visits
/// `Start → AwaitingReadiness → StageRunning("extract") →
/// StageRunning("load") → Succeeded`, with any state able to transition to
/// `Failed`. There are no loops back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Run constructed, nothing attempted yet.
    Start,
    /// The readiness gate is holding the run.
    AwaitingReadiness,
    /// The named external stage is in flight.
    StageRunning {
        /// The stage name from its spec.
        stage: String,
    },
    /// Every stage completed with a clean exit.
    Succeeded,
    /// The gate or a stage failed; nothing further runs.
    Failed,
}

impl RunState {
    /// Creates the running state for a named stage.
    #[must_use]
    pub fn stage_running(stage: impl Into<String>) -> Self {
        Self::StageRunning {
            stage: stage.into(),
        }
    }

    /// Returns true for the two terminal states.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::AwaitingReadiness => write!(f, "awaiting readiness"),
            Self::StageRunning { stage } => write!(f, "running {stage}"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One ephemeral pipeline run: dependencies to gate on, the retry policy,
/// and the ordered stages to execute.
///
/// Created at invocation start and destroyed at process exit; nothing
/// persists across runs.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Generated id for log correlation.
    pub run_id: Uuid,
    /// Pipeline name from configuration.
    pub pipeline: String,
    /// Data stores that must be ready before any stage runs.
    pub dependencies: Vec<Dependency>,
    /// Readiness retry policy.
    pub policy: RetryPolicy,
    /// Stages in execution order (extract, then load, in the shipped
    /// configuration).
    pub stages: Vec<StageSpec>,
}

impl PipelineRun {
    /// Creates an empty run for the named pipeline.
    #[must_use]
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            dependencies: Vec::new(),
            policy: RetryPolicy::default(),
            stages: Vec::new(),
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Replaces the dependency list.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|spec| spec.name.as_str()).collect()
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The run id.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// Visited states in order, ending with [`RunState::Succeeded`].
    pub states: Vec<RunState>,
    /// How the readiness gate went.
    pub gate: GateReport,
    /// Results of every stage, in execution order.
    pub stages: Vec<StageResult>,
    /// Total wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl RunReport {
    /// Stage names in the order they completed.
    #[must_use]
    pub fn stage_order(&self) -> Vec<&str> {
        self.stages.iter().map(|result| result.stage.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_state_display() {
        assert_eq!(RunState::Start.to_string(), "start");
        assert_eq!(RunState::AwaitingReadiness.to_string(), "awaiting readiness");
        assert_eq!(RunState::stage_running("extract").to_string(), "running extract");
        assert_eq!(RunState::Succeeded.to_string(), "succeeded");
        assert_eq!(RunState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Start.is_terminal());
        assert!(!RunState::AwaitingReadiness.is_terminal());
        assert!(!RunState::stage_running("load").is_terminal());
    }

    #[test]
    fn test_run_builders() {
        let run = PipelineRun::new("film-catalog")
            .with_dependency(Dependency::new("source", "localhost").with_port(5432))
            .with_policy(RetryPolicy::default().with_max_attempts(3))
            .with_stage(StageSpec::new("extract", "pg_dump"))
            .with_stage(StageSpec::new("load", "psql"));

        assert_eq!(run.pipeline, "film-catalog");
        assert_eq!(run.dependencies.len(), 1);
        assert_eq!(run.policy.max_attempts, 3);
        assert_eq!(run.stage_names(), vec!["extract", "load"]);
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = PipelineRun::new("p");
        let b = PipelineRun::new("p");
        assert_ne!(a.run_id, b.run_id);
    }
}
