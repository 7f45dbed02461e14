//! Drives one run through the gate and the ordered stages.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{GateFailure, PipelineError};
use crate::gate::ReadinessGate;
use crate::pipeline::run::{PipelineRun, RunReport, RunState};
use crate::probe::{ReadinessProbe, TcpProbe};
use crate::stage::{ExitIndicator, ProcessStageRunner, StageRunner};

/// Executes pipeline runs: gate first, then each stage in order,
/// stopping at the first failure.
///
/// The orchestrator never retries a stage and never rolls anything back;
/// a failed run leaves whatever the stages wrote for the operator to
/// inspect. Cancellation is honored at the gate, between stages, and (for
/// runners wired with the same token) inside a running stage.
#[derive(Debug)]
pub struct PipelineOrchestrator {
    probe: Arc<dyn ReadinessProbe>,
    runner: Arc<dyn StageRunner>,
    shutdown: CancellationToken,
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self {
            probe: Arc::new(TcpProbe::new()),
            runner: Arc::new(ProcessStageRunner::new()),
            shutdown: CancellationToken::new(),
        }
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over the TCP probe and the process runner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the readiness probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replaces the stage runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn StageRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Installs a shutdown token, honored at the gate and between stages.
    ///
    /// A runner carries its own token, so to interrupt an in-flight stage
    /// give [`ProcessStageRunner::with_shutdown`] the same token.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Runs the pipeline to a terminal state.
    ///
    /// Succeeds only when every dependency reported ready and every stage
    /// exited cleanly. The first failure ends the run:
    /// [`PipelineError::DependenciesNotReady`] when the gate gives up,
    /// [`PipelineError::StageFailed`] carrying the failed stage's captured
    /// output, or [`PipelineError::Cancelled`] when shutdown was requested.
    pub async fn execute(&self, run: PipelineRun) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        info!(
            run_id = %run.run_id,
            pipeline = %run.pipeline,
            dependencies = run.dependencies.len(),
            stages = run.stages.len(),
            "pipeline run starting"
        );

        let mut states = vec![RunState::Start];

        Self::transition(&mut states, RunState::AwaitingReadiness);
        let gate = ReadinessGate::new(Arc::clone(&self.probe))
            .with_shutdown(self.shutdown.clone());
        let gate_report = match gate.await_ready(&run.dependencies, &run.policy).await {
            Ok(report) => report,
            Err(GateFailure::Cancelled) => {
                Self::transition(&mut states, RunState::Failed);
                return Err(PipelineError::cancelled("readiness wait"));
            }
            Err(GateFailure::Unready { attempts, unready }) => {
                Self::transition(&mut states, RunState::Failed);
                return Err(PipelineError::DependenciesNotReady { attempts, unready });
            }
        };

        let mut results = Vec::with_capacity(run.stages.len());
        for spec in &run.stages {
            if self.shutdown.is_cancelled() {
                Self::transition(&mut states, RunState::Failed);
                return Err(PipelineError::cancelled(format!("before {} stage", spec.name)));
            }

            Self::transition(&mut states, RunState::stage_running(&spec.name));
            let result = self.runner.run(spec).await;

            if result.exit == ExitIndicator::Cancelled {
                Self::transition(&mut states, RunState::Failed);
                return Err(PipelineError::cancelled(format!("{} stage", spec.name)));
            }
            if !result.succeeded {
                Self::transition(&mut states, RunState::Failed);
                warn!(
                    run_id = %run.run_id,
                    stage = %result.stage,
                    exit = %result.exit,
                    "pipeline run failed"
                );
                return Err(PipelineError::stage_failed(result));
            }
            results.push(result);
        }

        Self::transition(&mut states, RunState::Succeeded);
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %run.run_id,
            pipeline = %run.pipeline,
            duration_ms,
            "pipeline run succeeded"
        );

        Ok(RunReport {
            run_id: run.run_id,
            pipeline: run.pipeline,
            states,
            gate: gate_report,
            stages: results,
            duration_ms,
        })
    }

    fn transition(states: &mut Vec<RunState>, next: RunState) {
        if let Some(current) = states.last() {
            debug!(from = %current, to = %next, "run state transition");
        }
        states.push(next);
    }
}
