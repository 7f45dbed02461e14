//! # Eltflow
//!
//! A readiness-gated orchestrator for extract/load pipelines.
//!
//! Eltflow runs a fixed, ordered pipeline of external commands against data
//! stores that may still be starting up:
//!
//! - **Readiness gating**: TCP-probe every declared dependency under a
//!   bounded fixed-interval retry policy before anything runs
//! - **External stages**: Invoke extract and load as child processes with
//!   captured output and env-overlay credentials
//! - **Explicit run states**: One linear state machine per run, failing
//!   fast with no stage retries and no rollback
//! - **Cancellation**: A shutdown token honored at every suspension point
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use eltflow::prelude::*;
//!
//! // Describe a run
//! let run = PipelineRun::new("film-catalog")
//!     .with_dependency(Dependency::new("source", "localhost").with_port(5432))
//!     .with_stage(StageSpec::new("extract", "pg_dump"))
//!     .with_stage(StageSpec::new("load", "psql"));
//!
//! // Gate on readiness, then execute the stages in order
//! let report = PipelineOrchestrator::new().execute(run).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod gate;
pub mod pipeline;
pub mod probe;
pub mod stage;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        load_pipeline, parse_pipeline_str, PipelineConfig, ReadinessConfig,
        StageConfig,
    };
    pub use crate::errors::{
        ConfigError, GateFailure, PipelineError, UnreadyDependency,
    };
    pub use crate::gate::{GateReport, ReadinessGate, RetryPolicy};
    pub use crate::pipeline::{
        PipelineOrchestrator, PipelineRun, RunReport, RunState,
    };
    pub use crate::probe::{Dependency, ProbeOutcome, ReadinessProbe, TcpProbe};
    pub use crate::stage::{
        ExitIndicator, ProcessStageRunner, StageResult, StageRunner, StageSpec,
    };
}
