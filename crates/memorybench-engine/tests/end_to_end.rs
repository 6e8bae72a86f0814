//! Full pipeline against the in-memory provider, driven from a config file.

use std::path::Path;

use memorybench_engine::config::{parse_benchmark, validate_benchmark};
use memorybench_engine::dataset::{index_questions, load_dataset};
use memorybench_engine::resolve::{artifact_dir, create_checkpoint_backend, create_collaborators};
use memorybench_engine::{run_benchmark, RunReport, RunRequest, StopSignal};
use memorybench_types::phase::Phase;
use memorybench_types::state::RunId;

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[tokio::test]
async fn smoke_benchmark_runs_to_completion() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = parse_benchmark(&fixture("benchmark.yaml")).unwrap();
    validate_benchmark(&config).unwrap();
    config.output_dir = tmp.path().to_path_buf();

    let questions = load_dataset(&config.dataset).unwrap();
    let run_id = RunId::new("smoke-1");
    let mut request = RunRequest::new(run_id.clone(), questions.clone());
    request.concurrency = config.concurrency;
    request.search_limit = config.search.limit;
    request.max_retries = config.retry.max_retries;

    let outcome = run_benchmark(
        create_checkpoint_backend(&config).unwrap(),
        artifact_dir(&config, &run_id),
        create_collaborators(&config).unwrap(),
        request,
        StopSignal::new(),
    )
    .await
    .unwrap();

    assert!(outcome.checkpoint.is_complete());
    assert_eq!(outcome.answers_flushed, 3);
    assert!(outcome.summaries.iter().all(|s| s.concurrency == 2));
    assert!(tmp.path().join("checkpoints").join("smoke-1.json").exists());

    let report = RunReport::build(&outcome.checkpoint, &index_questions(questions), chrono::Utc::now());
    assert_eq!(report.accuracy.evaluated, 3);
    assert_eq!(report.accuracy.correct, 2);
    assert_eq!(report.accuracy_by_type["single-session-preference"].correct, 0);
    let retrieval = report.retrieval.unwrap();
    assert_eq!(retrieval.scored, 2);
    assert!((retrieval.hit_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(report.phases[Phase::ALL.len() - 1].counts.completed, 3);

    let path = report.write(&artifact_dir(&config, &run_id)).unwrap();
    assert!(path.ends_with("smoke-1/report.json"));
    assert!(tmp.path().join("smoke-1").join("answers.json").exists());
}

#[tokio::test]
async fn injected_indexing_failures_do_not_halt() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = parse_benchmark(&fixture("benchmark.yaml")).unwrap();
    config.output_dir = tmp.path().to_path_buf();
    config.provider.config["fail_every_nth"] = serde_json::json!(2);

    let questions = load_dataset(&config.dataset).unwrap();
    let run_id = RunId::new("flaky");
    let outcome = run_benchmark(
        create_checkpoint_backend(&config).unwrap(),
        artifact_dir(&config, &run_id),
        create_collaborators(&config).unwrap(),
        RunRequest::new(run_id.clone(), questions),
        StopSignal::new(),
    )
    .await
    .unwrap();

    // Episode-level failures are recorded in progress, not as item failures.
    assert_eq!(outcome.checkpoint.status_counts(Phase::Indexing).completed, 3);
    let failed_episodes: usize = outcome
        .checkpoint
        .questions
        .values()
        .filter_map(|q| q.phase(Phase::Indexing).indexing_progress())
        .map(|p| p.failed_ids.len())
        .sum();
    assert_eq!(failed_episodes, 2);
}
