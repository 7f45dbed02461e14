use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use eltflow::config;
use eltflow::pipeline::PipelineOrchestrator;
use eltflow::probe::TcpProbe;
use eltflow::stage::ProcessStageRunner;

use crate::signal;

/// Execute the `run` command: parse, validate, gate on readiness, then
/// run extract and load.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let config = config::load_pipeline(pipeline_path)
        .with_context(|| format!("failed to load pipeline: {}", pipeline_path.display()))?;
    config.validate()?;

    tracing::info!(
        pipeline = config.pipeline,
        dependencies = config.dependencies.len(),
        "pipeline validated"
    );

    // One token stops the gate, the between-stage checks, and any child
    // process the runner has in flight.
    let shutdown = CancellationToken::new();
    signal::spawn_shutdown_listener(shutdown.clone());

    let probe = TcpProbe::new().with_timeout(config.readiness.probe_timeout());
    let runner = ProcessStageRunner::new().with_shutdown(shutdown.clone());
    let orchestrator = PipelineOrchestrator::new()
        .with_probe(Arc::new(probe))
        .with_runner(Arc::new(runner))
        .with_shutdown(shutdown);

    match orchestrator.execute(config.to_run()).await {
        Ok(report) => {
            println!("Pipeline '{}' completed successfully.", report.pipeline);
            println!("  Run id:        {}", report.run_id);
            println!("  Gate attempts: {}", report.gate.attempts);
            for result in &report.stages {
                println!(
                    "  {:14} {} ms",
                    format!("{}:", result.stage),
                    result.duration_ms()
                );
            }
            println!("  Duration:      {} ms", report.duration_ms);
            Ok(())
        }
        Err(error) => {
            if let Some(diagnostics) = error.diagnostics() {
                eprintln!("{diagnostics}");
            }
            let outcome = if error.is_cancelled() { "cancelled" } else { "failed" };
            Err(error).with_context(|| format!("pipeline '{}' {outcome}", config.pipeline))
        }
    }
}
