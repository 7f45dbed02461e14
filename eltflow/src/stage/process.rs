//! Stage runner backed by real child processes.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{ExitIndicator, StageResult, StageRunner, StageSpec};

/// Runs stage commands as child processes via `tokio::process`.
///
/// The child inherits the parent environment with the spec's overlay
/// applied on top, gets a closed stdin so interactive tools cannot hang
/// the stage, and has stdout/stderr captured for diagnostics. When the
/// shutdown token fires mid-wait, the child is killed and the result
/// carries the cancelled indicator.
#[derive(Debug, Clone, Default)]
pub struct ProcessStageRunner {
    shutdown: CancellationToken,
}

impl ProcessStageRunner {
    /// Creates a runner without cancellation wired in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a cancellation token honored while waiting on the child.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

#[async_trait]
impl StageRunner for ProcessStageRunner {
    async fn run(&self, spec: &StageSpec) -> StageResult {
        let started_at = Utc::now();
        info!(stage = %spec.name, program = %spec.program, "starting stage");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                warn!(stage = %spec.name, program = %spec.program, %error, "stage failed to launch");
                return StageResult::launch_failure(&spec.name, error.to_string(), started_at);
            }
        };

        // Dropping the wait future on cancellation kills the child via
        // kill_on_drop.
        let output = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                warn!(stage = %spec.name, "stage cancelled, terminating process");
                return StageResult::cancelled(&spec.name, started_at);
            }
            output = child.wait_with_output() => output,
        };

        match output {
            Ok(output) => {
                let exit = ExitIndicator::from_status(&output.status);
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if exit.is_success() {
                    info!(stage = %spec.name, %exit, "stage completed");
                } else {
                    warn!(stage = %spec.name, %exit, "stage failed");
                }
                StageResult::new(&spec.name, exit, stdout, stderr, started_at)
            }
            Err(error) => {
                warn!(stage = %spec.name, %error, "could not collect stage output");
                StageResult::launch_failure(&spec.name, error.to_string(), started_at)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn sh(name: &str, script: &str) -> StageSpec {
        StageSpec::new(name, "sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn test_zero_exit_succeeds_and_captures_stdout() {
        let runner = ProcessStageRunner::new();
        let result = runner.run(&sh("extract", "printf hello")).await;

        assert!(result.succeeded);
        assert_eq!(result.exit, ExitIndicator::Code(0));
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_with_code() {
        let runner = ProcessStageRunner::new();
        let result = runner.run(&sh("extract", "exit 3")).await;

        assert!(!result.succeeded);
        assert_eq!(result.exit, ExitIndicator::Code(3));
    }

    #[tokio::test]
    async fn test_stderr_is_captured() {
        let runner = ProcessStageRunner::new();
        let result = runner.run(&sh("load", "echo oops >&2; exit 1")).await;

        assert!(!result.succeeded);
        assert!(result.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_launch_failure() {
        let runner = ProcessStageRunner::new();
        let spec = StageSpec::new("extract", "eltflow-no-such-program");
        let result = runner.run(&spec).await;

        assert!(!result.succeeded);
        assert_eq!(result.exit, ExitIndicator::LaunchFailed);
        assert!(!result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_overlay_variable_reaches_the_child() {
        let runner = ProcessStageRunner::new();
        let spec = sh("extract", r#"printf "%s" "$ELTFLOW_TEST_SECRET""#)
            .with_env_var("ELTFLOW_TEST_SECRET", "hunter2");
        let result = runner.run(&spec).await;

        assert!(result.succeeded);
        assert_eq!(result.stdout, "hunter2");
    }

    #[tokio::test]
    async fn test_overlay_wins_over_inherited_environment() {
        std::env::set_var("ELTFLOW_TEST_OVERLAY", "parent");
        let runner = ProcessStageRunner::new();
        let spec = sh("extract", r#"printf "%s" "$ELTFLOW_TEST_OVERLAY""#)
            .with_env_var("ELTFLOW_TEST_OVERLAY", "child");
        let result = runner.run(&spec).await;
        std::env::remove_var("ELTFLOW_TEST_OVERLAY");

        assert_eq!(result.stdout, "child");
    }

    #[tokio::test]
    async fn test_closed_stdin_prevents_hanging_on_reads() {
        let runner = ProcessStageRunner::new();
        let result = runner.run(&sh("load", "cat")).await;

        assert!(result.succeeded);
        assert_eq!(result.stdout, "");
    }

    #[tokio::test]
    async fn test_cancellation_kills_the_child() {
        let shutdown = CancellationToken::new();
        let runner = ProcessStageRunner::new().with_shutdown(shutdown.clone());

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.cancel();
        });

        let started = std::time::Instant::now();
        let result = runner.run(&sh("load", "sleep 30")).await;
        handle.await.unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.exit, ExitIndicator::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
