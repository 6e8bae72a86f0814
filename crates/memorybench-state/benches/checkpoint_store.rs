//! Criterion benchmarks for checkpoint persistence.
//!
//! Every phase transition rewrites the whole run document, so write cost
//! scales with the number of questions in the run.

use std::sync::Arc;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use memorybench_state::prelude::*;

fn question_ids(count: usize) -> Vec<QuestionId> {
    (0..count).map(|i| QuestionId::new(format!("q{i}"))).collect()
}

fn bench_update_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("state/update_phase");

    for questions in [50_usize, 500] {
        group.bench_with_input(
            BenchmarkId::from_parameter(questions),
            &questions,
            |b, &questions| {
                let backend: Arc<dyn CheckpointBackend> =
                    Arc::new(SqliteCheckpointBackend::in_memory().unwrap());
                let store = CheckpointStore::create(
                    backend,
                    &RunId::new("bench"),
                    "in_memory",
                    question_ids(questions),
                    None,
                )
                .unwrap();
                let target = QuestionId::new("q0");

                b.iter(|| {
                    store
                        .update_phase(&target, Phase::Ingest, PhasePatch::in_progress(Utc::now()))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_file_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("state/file_save");
    let dir = tempfile::tempdir().unwrap();
    let backend = FileCheckpointBackend::open(dir.path()).unwrap();
    let checkpoint = RunCheckpoint::new(
        RunId::new("bench"),
        "in_memory",
        question_ids(500),
        None,
        Utc::now(),
    );

    group.bench_function("500_questions", |b| {
        b.iter(|| backend.save(&checkpoint).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_update_phase, bench_file_save);
criterion_main!(benches);
