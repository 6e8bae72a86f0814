pub mod report;
pub mod run;
pub mod runs;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};
use memorybench_engine::config::{parse_benchmark, validate_benchmark, BenchmarkConfig};

/// Parse and validate a benchmark file.
pub(crate) fn load_config(path: &Path) -> Result<BenchmarkConfig> {
    let config = parse_benchmark(path)
        .with_context(|| format!("Failed to parse benchmark: {}", path.display()))?;
    validate_benchmark(&config)?;
    Ok(config)
}
