//! Run engine for memorybench: drives memory providers through the
//! ingest → indexing → search → answer → evaluate pipeline with durable,
//! resumable per-question checkpoints.

pub mod concurrency;
pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod model;
pub mod orchestrator;
pub mod phases;
pub mod progress;
pub mod provider;
pub mod report;
pub mod resolve;
mod text;

// Re-export public API for convenience
pub use error::PipelineError;
pub use executor::StopSignal;
pub use orchestrator::{run_benchmark, Collaborators, PhaseWindow, RunOutcome, RunRequest};
pub use report::RunReport;
