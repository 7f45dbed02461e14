//! End-to-end runs over real sockets and real child processes.

use std::time::Duration;

use tokio::net::TcpListener;

use crate::errors::PipelineError;
use crate::gate::RetryPolicy;
use crate::pipeline::{PipelineOrchestrator, PipelineRun, RunState};
use crate::probe::Dependency;
use crate::stage::StageSpec;

async fn local_dependency(name: &str) -> (Dependency, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let dep = Dependency::new(name, "127.0.0.1").with_port(port);
    (dep, listener)
}

async fn closed_port_dependency(name: &str) -> Dependency {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Dependency::new(name, "127.0.0.1").with_port(port)
}

#[cfg(unix)]
fn sh(name: &str, script: impl Into<String>) -> StageSpec {
    let script = script.into();
    StageSpec::new(name, "sh").with_args(["-c", script.as_str()])
}

fn quick_policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(10))
}

#[cfg(unix)]
#[tokio::test]
async fn test_extract_output_reaches_load_through_the_filesystem() {
    let (source, _source_listener) = local_dependency("source").await;
    let (dest, _dest_listener) = local_dependency("dest").await;

    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump.sql");
    let loaded = dir.path().join("loaded.sql");

    let run = PipelineRun::new("film-catalog")
        .with_dependency(source)
        .with_dependency(dest)
        .with_policy(quick_policy())
        .with_stage(sh(
            "extract",
            format!("printf 'select 1;' > {}", dump.display()),
        ))
        .with_stage(sh(
            "load",
            format!("cat {} > {}", dump.display(), loaded.display()),
        ));

    let report = PipelineOrchestrator::new().execute(run).await.unwrap();

    assert_eq!(report.stage_order(), vec!["extract", "load"]);
    assert_eq!(report.states.last(), Some(&RunState::Succeeded));
    assert_eq!(std::fs::read_to_string(&loaded).unwrap(), "select 1;");
}

#[cfg(unix)]
#[tokio::test]
async fn test_env_overlay_reaches_the_child_process() {
    let (dest, _listener) = local_dependency("dest").await;

    let dir = tempfile::tempdir().unwrap();
    let witness = dir.path().join("password.txt");

    let extract = sh(
        "extract",
        format!("printf '%s' \"$PGPASSWORD\" > {}", witness.display()),
    )
    .with_env_var("PGPASSWORD", "hunter2");

    let run = PipelineRun::new("secrets")
        .with_dependency(dest)
        .with_policy(quick_policy())
        .with_stage(extract);

    PipelineOrchestrator::new().execute(run).await.unwrap();

    assert_eq!(std::fs::read_to_string(&witness).unwrap(), "hunter2");
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_extract_leaves_load_untouched() {
    let (dest, _listener) = local_dependency("dest").await;

    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("loaded.marker");

    let run = PipelineRun::new("film-catalog")
        .with_dependency(dest)
        .with_policy(quick_policy())
        .with_stage(sh("extract", "echo boom >&2; exit 1"))
        .with_stage(sh("load", format!("touch {}", marker.display())));

    let error = PipelineOrchestrator::new().execute(run).await.unwrap_err();

    match &error {
        PipelineError::StageFailed { stage, result } => {
            assert_eq!(stage, "extract");
            assert!(result.stderr.contains("boom"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_unready_dependency_blocks_every_stage() {
    let dest = closed_port_dependency("dest").await;

    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("extract.marker");

    #[cfg(unix)]
    let stage = sh("extract", format!("touch {}", marker.display()));
    #[cfg(not(unix))]
    let stage = StageSpec::new("extract", "true");

    let run = PipelineRun::new("film-catalog")
        .with_dependency(dest)
        .with_policy(quick_policy())
        .with_stage(stage);

    let error = PipelineOrchestrator::new().execute(run).await.unwrap_err();

    match &error {
        PipelineError::DependenciesNotReady { attempts, unready } => {
            assert_eq!(*attempts, 2);
            assert_eq!(unready[0].name, "dest");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!marker.exists());
}
