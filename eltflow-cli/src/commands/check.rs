use std::path::Path;

use anyhow::{Context, Result};
use futures::future::join_all;

use eltflow::config;
use eltflow::probe::{ReadinessProbe, TcpProbe};

/// Execute the `check` command: validate the pipeline file, then probe
/// every dependency once, concurrently.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let config = config::load_pipeline(pipeline_path)
        .with_context(|| format!("failed to load pipeline: {}", pipeline_path.display()))?;
    config.validate()?;
    println!("Pipeline structure: OK");

    if config.dependencies.is_empty() {
        println!("No dependencies declared.");
        return Ok(());
    }

    let probe = TcpProbe::new().with_timeout(config.readiness.probe_timeout());
    let outcomes = join_all(config.dependencies.iter().map(|dep| {
        let probe = &probe;
        async move { (dep, probe.check(dep).await) }
    }))
    .await;

    let mut failures = 0usize;
    for (dep, outcome) in outcomes {
        let status = if outcome.is_ready() { "OK" } else { "NOT READY" };
        println!("{:18} {status}", format!("{}:", dep.name));
        if let Some(detail) = outcome.detail() {
            println!("  {detail}");
        }
        if !outcome.is_ready() {
            failures += 1;
        }
    }

    if failures == 0 {
        println!("\nAll dependencies ready.");
        Ok(())
    } else {
        anyhow::bail!("{failures} dependency check(s) failed")
    }
}
