//! External stage invocation.
//!
//! A stage is one external command, the extract or the load, described by
//! a [`StageSpec`] and executed through the [`StageRunner`] capability
//! trait. The shipped [`ProcessStageRunner`] drives real processes; tests
//! substitute the fakes in [`crate::testing`].

mod process;

pub use process::ProcessStageRunner;

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Specification for one external invocation.
///
/// Immutable once constructed from configuration. The environment overlay
/// is applied on top of the inherited process environment, and the overlay
/// wins on key collision. Credentials travel here, never in `args`, so they
/// stay out of process listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage name used in diagnostics ("extract", "load").
    pub name: String,
    /// Executable path or name resolved via `PATH`.
    pub program: String,
    /// Ordered argument list.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overlay. Keys are unique by construction.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl StageSpec {
    /// Creates a spec with no arguments and an empty overlay.
    #[must_use]
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Replaces the argument list.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Appends one argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets one overlay variable.
    #[must_use]
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// How an external command terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitIndicator {
    /// The process exited with this code.
    Code(i32),
    /// The process was terminated by this signal.
    Signal(i32),
    /// The process could not be launched at all.
    LaunchFailed,
    /// The run was cancelled while the process was in flight.
    Cancelled,
}

impl ExitIndicator {
    /// Builds an indicator from a process exit status.
    #[must_use]
    pub fn from_status(status: &std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }
        Self::Code(-1)
    }

    /// Returns true only for a clean zero exit.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Code(0))
    }
}

impl std::fmt::Display for ExitIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signal(signal) => write!(f, "terminated by signal {signal}"),
            Self::LaunchFailed => write!(f, "failed to launch"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The result of one stage invocation.
///
/// Captured output is diagnostic only; the orchestrator never parses it
/// for control decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name from the spec.
    pub stage: String,
    /// Whether the command terminated with a clean zero exit.
    pub succeeded: bool,
    /// How the command terminated.
    pub exit: ExitIndicator,
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// When the invocation ended.
    pub ended_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a result; success is derived from the exit indicator.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        exit: ExitIndicator,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage: stage.into(),
            succeeded: exit.is_success(),
            exit,
            stdout: stdout.into(),
            stderr: stderr.into(),
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Creates a successful result with no captured output.
    #[must_use]
    pub fn ok(stage: impl Into<String>) -> Self {
        Self::new(stage, ExitIndicator::Code(0), "", "", Utc::now())
    }

    /// Creates a failed result with captured output.
    #[must_use]
    pub fn failed(
        stage: impl Into<String>,
        exit: ExitIndicator,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::new(stage, exit, stdout, stderr, Utc::now())
    }

    /// Creates a result for a command that never launched.
    #[must_use]
    pub fn launch_failure(
        stage: impl Into<String>,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::new(stage, ExitIndicator::LaunchFailed, "", message, started_at)
    }

    /// Creates a result for an invocation cancelled in flight.
    #[must_use]
    pub fn cancelled(stage: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self::new(stage, ExitIndicator::Cancelled, "", "", started_at)
    }

    /// Wall-clock duration of the invocation in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// Capability trait for running one external stage.
///
/// Infallible by contract: abnormal exits, launch failures, and
/// cancellation are all encoded in the returned [`StageResult`], so the
/// orchestrator has a single place to decide what is fatal.
#[async_trait]
pub trait StageRunner: Send + Sync + Debug {
    /// Runs the command described by the spec to termination.
    async fn run(&self, spec: &StageSpec) -> StageResult;
}
