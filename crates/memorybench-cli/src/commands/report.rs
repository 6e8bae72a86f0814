use std::path::Path;

use anyhow::Result;
use memorybench_engine::dataset::{index_questions, load_dataset};
use memorybench_engine::resolve::{artifact_dir, create_checkpoint_backend};
use memorybench_engine::RunReport;
use memorybench_types::state::RunId;

/// Execute the `report` command: rebuild and write the report of one run.
pub fn execute(config_path: &Path, run_id: &str, json: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    let backend = create_checkpoint_backend(&config)?;
    let run_id = RunId::new(run_id);
    let Some(checkpoint) = backend.load(&run_id)? else {
        anyhow::bail!("Run '{run_id}' not found");
    };
    let questions = index_questions(load_dataset(&config.dataset)?);

    let report = RunReport::build(&checkpoint, &questions, chrono::Utc::now());
    let path = report.write(&artifact_dir(&config, &run_id))?;
    tracing::info!(path = %path.display(), "Report written");

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}
