use std::path::Path;

use anyhow::Result;
use memorybench_engine::resolve::create_checkpoint_backend;
use memorybench_types::phase::Phase;

/// Execute the `runs` command: list every checkpointed run.
pub fn execute(config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;
    let backend = create_checkpoint_backend(&config)?;
    let runs = backend.list_runs()?;

    if runs.is_empty() {
        println!("No runs found in {}", config.checkpoint_path().display());
        return Ok(());
    }

    for run_id in runs {
        let Some(checkpoint) = backend.load(&run_id)? else {
            continue;
        };
        let evaluated = checkpoint.status_counts(Phase::Evaluate).completed;
        println!(
            "{:<32} {:<12} {:>4}/{:<4} evaluated  {}",
            checkpoint.run_id.as_str(),
            checkpoint.provider,
            evaluated,
            checkpoint.questions.len(),
            if checkpoint.is_complete() { "complete" } else { "incomplete" }
        );
    }
    Ok(())
}
