//! Pipeline orchestration.
//!
//! A [`PipelineRun`] describes one invocation: the dependencies to gate on,
//! the retry policy, and the stages to execute in order. The
//! [`PipelineOrchestrator`] drives it through the explicit [`RunState`]
//! machine, failing fast on the first gate or stage failure. Stages are
//! never retried and nothing is rolled back.

#[cfg(test)]
mod integration_tests;
mod orchestrator;
mod run;

pub use orchestrator::PipelineOrchestrator;
pub use run::{PipelineRun, RunReport, RunState};
