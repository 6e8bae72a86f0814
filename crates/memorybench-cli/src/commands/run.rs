use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use memorybench_engine::dataset::{index_questions, load_dataset};
use memorybench_engine::resolve::{artifact_dir, create_checkpoint_backend, create_collaborators};
use memorybench_engine::{run_benchmark, PhaseWindow, RunReport, RunRequest, StopSignal};
use memorybench_types::concurrency::ConcurrencyOverrides;
use memorybench_types::phase::Phase;
use memorybench_types::state::{QuestionId, RunId};

/// Operator controls for `memorybench run`.
pub struct RunArgs {
    pub run_id: Option<String>,
    pub questions: Vec<String>,
    pub from_phase: Option<Phase>,
    pub to_phase: Option<Phase>,
    pub concurrency: Option<u32>,
}

/// Execute the `run` command: create or resume a run and print its report.
pub async fn execute(config_path: &Path, args: RunArgs) -> Result<()> {
    let config = super::load_config(config_path)?;
    let window = PhaseWindow::new(args.from_phase, args.to_phase)?;
    let questions = load_dataset(&config.dataset)?;

    let run_id = RunId::new(args.run_id.unwrap_or_else(|| {
        format!(
            "{}-{}",
            config.benchmark,
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        )
    }));
    let concurrency = match (config.concurrency, args.concurrency) {
        (base, Some(n)) => Some(ConcurrencyOverrides {
            default: Some(n),
            ..base.unwrap_or_default()
        }),
        (base, None) => base,
    };
    let filter = (!args.questions.is_empty()).then(|| {
        args.questions
            .into_iter()
            .map(QuestionId::new)
            .collect::<BTreeSet<_>>()
    });

    tracing::info!(
        benchmark = config.benchmark,
        run_id = run_id.as_str(),
        provider = config.provider.kind,
        questions = questions.len(),
        "Benchmark validated"
    );

    let stop = StopSignal::new();
    let on_ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Stop requested; waiting for in-flight items to finish");
            on_ctrl_c.stop();
        }
    });

    let request = RunRequest {
        run_id: run_id.clone(),
        questions: questions.clone(),
        filter,
        window,
        concurrency,
        search_limit: config.search.limit,
        max_retries: config.retry.max_retries,
    };
    let artifacts = artifact_dir(&config, &run_id);
    let outcome = run_benchmark(
        create_checkpoint_backend(&config)?,
        artifact_dir(&config, &run_id),
        create_collaborators(&config)?,
        request,
        stop,
    )
    .await?;

    println!("Run '{}' finished in {:.2}s.", outcome.run_id, outcome.duration_secs);
    for s in &outcome.summaries {
        println!(
            "  {:<10} {:>4} eligible, {:>4} completed, {:>4} failed ({} workers, {:.2}s)",
            s.phase.as_str(),
            s.eligible,
            s.completed,
            s.failed,
            s.concurrency,
            s.duration_secs
        );
    }
    if outcome.answers_flushed > 0 {
        println!("  Answers written: {}", outcome.answers_flushed);
    }

    let report = RunReport::build(
        &outcome.checkpoint,
        &index_questions(questions),
        chrono::Utc::now(),
    );
    let path = report.write(&artifacts)?;
    println!();
    print!("{}", report.render());
    println!("Report: {}", path.display());
    if !report.complete {
        println!("Run incomplete; resume with `--run-id {}`.", outcome.run_id);
    }
    Ok(())
}
