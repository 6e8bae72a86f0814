use std::path::Path;

use anyhow::Result;
use memorybench_engine::resolve::{artifact_dir, create_checkpoint_backend};
use memorybench_state::AnswerStore;
use memorybench_types::phase::Phase;
use memorybench_types::state::RunId;

/// Execute the `status` command: per-phase status counts of one run.
pub fn execute(config_path: &Path, run_id: &str) -> Result<()> {
    let config = super::load_config(config_path)?;
    let backend = create_checkpoint_backend(&config)?;
    let run_id = RunId::new(run_id);
    let Some(checkpoint) = backend.load(&run_id)? else {
        anyhow::bail!("Run '{run_id}' not found");
    };

    println!(
        "Run '{}' ({}), {} questions, created {}",
        checkpoint.run_id,
        checkpoint.provider,
        checkpoint.questions.len(),
        checkpoint.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {:<10} {:>8} {:>11} {:>9} {:>6}",
        "phase", "pending", "in_progress", "completed", "failed"
    );
    for phase in Phase::ALL {
        let c = checkpoint.status_counts(phase);
        println!(
            "  {:<10} {:>8} {:>11} {:>9} {:>6}",
            phase.as_str(),
            c.pending,
            c.in_progress,
            c.completed,
            c.failed
        );
    }

    let artifacts = artifact_dir(&config, &run_id);
    let answers = AnswerStore::new(artifacts.clone()).load_flushed()?;
    println!(
        "Artifacts: {} ({} answers written)",
        artifacts.root().display(),
        answers.len()
    );
    if checkpoint.is_complete() {
        println!("Complete.");
    }
    Ok(())
}
