//! Pipeline configuration: the YAML schema, its semantic rules, and the
//! conversion into a runnable [`PipelineRun`].
//!
//! A pipeline file names its dependencies, tunes the readiness policy, and
//! describes the extract and load commands. Secrets enter through
//! `${VAR}` references substituted from the environment at load time and
//! land in stage env overlays, never in argv.

mod parser;

pub use parser::{load_pipeline, parse_pipeline_str, substitute_env_vars};

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::gate::RetryPolicy;
use crate::pipeline::PipelineRun;
use crate::probe::Dependency;
use crate::stage::StageSpec;

fn default_max_attempts() -> u32 {
    5
}
fn default_delay_ms() -> u64 {
    5000
}
fn default_probe_timeout_ms() -> u64 {
    2000
}

/// Readiness gate tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Attempt rounds before the gate gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between rounds, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Per-probe connect budget, in milliseconds. Must stay below
    /// `delay_ms` so one round cannot outlive its slot.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl ReadinessConfig {
    /// The retry policy this configuration describes.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }

    /// The per-probe timeout.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// One external command in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Program to invoke.
    pub program: String,
    /// Arguments, in order.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overlay. Overlay values win over inherited ones, so
    /// this is where credentials belong.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl StageConfig {
    fn to_spec(&self, name: &str) -> StageSpec {
        let mut spec = StageSpec::new(name, &self.program).with_args(self.args.clone());
        for (key, value) in &self.env {
            spec = spec.with_env_var(key, value);
        }
        spec
    }
}

/// A parsed pipeline file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, used in logs and reports.
    pub pipeline: String,
    /// Data stores the gate must see ready before any stage runs.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Readiness gate tuning.
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// The extract command.
    pub extract: StageConfig,
    /// The load command.
    pub load: StageConfig,
}

impl PipelineConfig {
    /// Checks every semantic rule, reporting all violations at once.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] listing every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.pipeline.trim().is_empty() {
            problems.push("pipeline name must not be empty".to_string());
        }

        if self.readiness.max_attempts == 0 {
            problems.push("readiness.max_attempts must be at least 1".to_string());
        }
        if self.readiness.delay_ms == 0 {
            problems.push("readiness.delay_ms must be at least 1".to_string());
        }
        if self.readiness.probe_timeout_ms == 0 {
            problems.push("readiness.probe_timeout_ms must be at least 1".to_string());
        } else if self.readiness.probe_timeout_ms >= self.readiness.delay_ms {
            problems.push(format!(
                "readiness.probe_timeout_ms ({}) must be below readiness.delay_ms ({})",
                self.readiness.probe_timeout_ms, self.readiness.delay_ms
            ));
        }

        let mut seen = Vec::new();
        for (i, dep) in self.dependencies.iter().enumerate() {
            if dep.name.trim().is_empty() {
                problems.push(format!("dependency {i} has an empty name"));
                continue;
            }
            if dep.host.trim().is_empty() {
                problems.push(format!("dependency '{}' has an empty host", dep.name));
            }
            if seen.contains(&dep.name.as_str()) {
                problems.push(format!("duplicate dependency name '{}'", dep.name));
            } else {
                seen.push(dep.name.as_str());
            }
        }

        if self.extract.program.trim().is_empty() {
            problems.push("extract.program must not be empty".to_string());
        }
        if self.load.program.trim().is_empty() {
            problems.push("load.program must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// Builds the run this configuration describes: extract first, load
    /// second, with a fresh run id.
    #[must_use]
    pub fn to_run(&self) -> PipelineRun {
        PipelineRun::new(&self.pipeline)
            .with_dependencies(self.dependencies.clone())
            .with_policy(self.readiness.policy())
            .with_stage(self.extract.to_spec("extract"))
            .with_stage(self.load.to_spec("load"))
    }
}
