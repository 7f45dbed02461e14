//! Error types for the eltflow pipeline.
//!
//! Every failure a run can produce lives here: configuration problems,
//! readiness-gate exhaustion, and stage failures. The orchestrator never
//! panics on these; they all surface through its result.

use std::path::PathBuf;

use thiserror::Error;

use crate::stage::StageResult;

/// A dependency that was still unready when the gate gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadyDependency {
    /// The dependency name from configuration.
    pub name: String,
    /// Detail from the last probe, when the probe reported one.
    pub detail: Option<String>,
}

impl UnreadyDependency {
    /// Creates an unready-dependency record.
    #[must_use]
    pub fn new(name: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            name: name.into(),
            detail,
        }
    }
}

impl std::fmt::Display for UnreadyDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

fn join_unready(unready: &[UnreadyDependency]) -> String {
    unready
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error raised when the readiness gate does not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateFailure {
    /// One or more dependencies never became ready within the retry budget.
    #[error("dependencies not ready after {attempts} attempt(s): {}", join_unready(.unready))]
    Unready {
        /// Attempt rounds performed before giving up.
        attempts: u32,
        /// Every dependency still unready, with its last probe detail.
        unready: Vec<UnreadyDependency>,
    },

    /// The wait was cancelled before all dependencies became ready.
    #[error("readiness wait cancelled")]
    Cancelled,
}

impl GateFailure {
    /// Creates an unready failure.
    #[must_use]
    pub fn unready(attempts: u32, unready: Vec<UnreadyDependency>) -> Self {
        Self::Unready { attempts, unready }
    }

    /// Names of the dependencies still unready, in declaration order.
    #[must_use]
    pub fn unready_names(&self) -> Vec<&str> {
        match self {
            Self::Unready { unready, .. } => {
                unready.iter().map(|dep| dep.name.as_str()).collect()
            }
            Self::Cancelled => Vec::new(),
        }
    }
}

/// The top-level error for a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The readiness gate exhausted its retry budget.
    #[error("dependency not ready: {}", join_unready(.unready))]
    DependenciesNotReady {
        /// Attempt rounds performed before giving up.
        attempts: u32,
        /// Every dependency still unready.
        unready: Vec<UnreadyDependency>,
    },

    /// An external stage terminated abnormally.
    #[error("{stage} failed: {}", .result.exit)]
    StageFailed {
        /// The failing stage name.
        stage: String,
        /// The full result of the failed invocation.
        result: StageResult,
    },

    /// The run was cancelled at a suspension point.
    #[error("run cancelled during {phase}")]
    Cancelled {
        /// What the run was doing when the token fired.
        phase: String,
    },
}

impl PipelineError {
    /// Creates a stage-failure error from a failed result.
    #[must_use]
    pub fn stage_failed(result: StageResult) -> Self {
        Self::StageFailed {
            stage: result.stage.clone(),
            result,
        }
    }

    /// Creates a cancelled error for the given phase.
    #[must_use]
    pub fn cancelled(phase: impl Into<String>) -> Self {
        Self::Cancelled {
            phase: phase.into(),
        }
    }

    /// Returns true for the cancelled outcome.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Diagnostic text for the failure, suitable for stderr.
    ///
    /// For stage failures this is the captured stderr (falling back to
    /// stdout); other variants have no text beyond their display form.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::StageFailed { result, .. } => {
                let text = if result.stderr.trim().is_empty() {
                    result.stdout.trim()
                } else {
                    result.stderr.trim()
                };
                (!text.is_empty()).then_some(text)
            }
            _ => None,
        }
    }
}

/// Error raised while loading or validating a pipeline configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read pipeline file {}", .path.display())]
    Read {
        /// The path that was attempted.
        path: PathBuf,
        /// The underlying io error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for the pipeline schema.
    #[error("failed to parse pipeline YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The file references environment variables that are not set.
    #[error("missing environment variable(s): {}", .names.join(", "))]
    MissingEnvVars {
        /// Every unset variable, in order of first reference.
        names: Vec<String>,
    },

    /// The parsed configuration violates a semantic rule.
    #[error("invalid pipeline configuration: {}", .problems.join("; "))]
    Invalid {
        /// Every rule violation found.
        problems: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{ExitIndicator, StageResult};

    #[test]
    fn test_unready_display_with_detail() {
        let dep = UnreadyDependency::new("dest", Some("connection refused".to_string()));
        assert_eq!(dep.to_string(), "dest (connection refused)");
    }

    #[test]
    fn test_unready_display_without_detail() {
        let dep = UnreadyDependency::new("source", None);
        assert_eq!(dep.to_string(), "source");
    }

    #[test]
    fn test_gate_failure_names_every_unready_dependency() {
        let failure = GateFailure::unready(
            3,
            vec![
                UnreadyDependency::new("source", None),
                UnreadyDependency::new("dest", Some("timed out".to_string())),
            ],
        );

        assert_eq!(failure.unready_names(), vec!["source", "dest"]);
        let message = failure.to_string();
        assert!(message.contains("3 attempt(s)"));
        assert!(message.contains("source"));
        assert!(message.contains("dest (timed out)"));
    }

    #[test]
    fn test_pipeline_error_dependency_not_ready_display() {
        let error = PipelineError::DependenciesNotReady {
            attempts: 5,
            unready: vec![UnreadyDependency::new("dest", None)],
        };
        assert_eq!(error.to_string(), "dependency not ready: dest");
    }

    #[test]
    fn test_pipeline_error_stage_failed_display() {
        let result = StageResult::failed("extract", ExitIndicator::Code(1), "", "no such table");
        let error = PipelineError::stage_failed(result);

        assert_eq!(error.to_string(), "extract failed: exit code 1");
        assert_eq!(error.diagnostics(), Some("no such table"));
    }

    #[test]
    fn test_pipeline_error_stage_failed_diagnostics_fall_back_to_stdout() {
        let result = StageResult::failed("load", ExitIndicator::Code(2), "partial output", "");
        let error = PipelineError::stage_failed(result);

        assert_eq!(error.to_string(), "load failed: exit code 2");
        assert_eq!(error.diagnostics(), Some("partial output"));
    }

    #[test]
    fn test_pipeline_error_cancelled() {
        let error = PipelineError::cancelled("readiness wait");
        assert!(error.is_cancelled());
        assert_eq!(error.to_string(), "run cancelled during readiness wait");
    }

    #[test]
    fn test_config_error_missing_env_vars_lists_all() {
        let error = ConfigError::MissingEnvVars {
            names: vec!["SOURCE_PGPASSWORD".to_string(), "DEST_PGPASSWORD".to_string()],
        };
        let message = error.to_string();
        assert!(message.contains("SOURCE_PGPASSWORD"));
        assert!(message.contains("DEST_PGPASSWORD"));
    }

    #[test]
    fn test_config_error_invalid_joins_problems() {
        let error = ConfigError::Invalid {
            problems: vec![
                "readiness.max_attempts must be at least 1".to_string(),
                "extract.program must not be empty".to_string(),
            ],
        };
        let message = error.to_string();
        assert!(message.starts_with("invalid pipeline configuration:"));
        assert!(message.contains("max_attempts"));
        assert!(message.contains("extract.program"));
    }
}
