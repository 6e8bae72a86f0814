//! Benchmark YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::BenchmarkConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let result = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| {
            missing.push(cap[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        missing.dedup();
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }
    Ok(result.into_owned())
}

/// Parse a benchmark YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_benchmark_str(yaml_str: &str) -> Result<BenchmarkConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    serde_yaml::from_str(&substituted).context("Failed to parse benchmark YAML")
}

/// Parse a benchmark YAML file; relative paths inside it are resolved
/// against the file's directory.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_benchmark(path: &Path) -> Result<BenchmarkConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read benchmark file: {}", path.display()))?;
    let mut config = parse_benchmark_str(&content)
        .with_context(|| format!("Invalid benchmark file: {}", path.display()))?;
    if let Some(dir) = path.parent() {
        config.resolve_paths(dir);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::CheckpointBackendKind;
    use memorybench_types::phase::Phase;
    use std::path::PathBuf;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("MB_TEST_API_KEY", "sk-123");
        let result = substitute_env_vars("api_key: ${MB_TEST_API_KEY}").unwrap();
        assert_eq!(result, "api_key: sk-123");
        std::env::remove_var("MB_TEST_API_KEY");
    }

    #[test]
    fn test_no_env_vars_passthrough() {
        let input = "benchmark: longmemeval\nlimit: 5";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_missing_env_vars_all_reported() {
        let err = substitute_env_vars("${MB_MISSING_X} and ${MB_MISSING_Y}")
            .unwrap_err()
            .to_string();
        assert!(err.contains("MB_MISSING_X"));
        assert!(err.contains("MB_MISSING_Y"));
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let yaml = r#"
version: "1.0"
benchmark: longmemeval-s
dataset: data/questions.json
provider:
  kind: in_memory
"#;
        let config = parse_benchmark_str(yaml).unwrap();
        assert_eq!(config.answer_model.kind, "extractive");
        assert_eq!(config.judge.kind, "containment");
        assert_eq!(config.search.limit, 10);
        assert_eq!(config.retry.max_retries, 2);
        assert!(config.concurrency.is_none());
        assert!(config.provider.config.is_null());
        assert_eq!(config.checkpoint.backend, CheckpointBackendKind::Sqlite);
        assert_eq!(config.checkpoint_path(), PathBuf::from("results/checkpoints.db"));
    }

    #[test]
    fn test_full_config() {
        std::env::set_var("MB_TEST_DELAY", "40");
        let yaml = r#"
version: "1.0"
benchmark: longmemeval-s
dataset: data/questions.json
provider:
  kind: in_memory
  config:
    index_delay_ms: ${MB_TEST_DELAY}
answer_model:
  kind: extractive
judge:
  kind: containment
search:
  limit: 3
concurrency:
  default: 4
  indexing: 16
checkpoint:
  backend: file
output_dir: out
"#;
        let config = parse_benchmark_str(yaml).unwrap();
        std::env::remove_var("MB_TEST_DELAY");
        assert_eq!(config.provider.config["index_delay_ms"], 40);
        let concurrency = config.concurrency.unwrap();
        assert_eq!(concurrency.blanket(), Some(4));
        assert_eq!(concurrency.for_phase(Phase::Indexing), Some(16));
        assert_eq!(config.checkpoint_path(), PathBuf::from("out/checkpoints"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
version: "1.0"
benchmark: b
dataset: d.json
provider:
  kind: in_memory
concurrency:
  searching: 3
"#;
        assert!(parse_benchmark_str(yaml).is_err());
    }

    #[test]
    fn test_parse_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.yaml");
        std::fs::write(
            &path,
            "version: \"1.0\"\nbenchmark: b\ndataset: data.json\nprovider:\n  kind: in_memory\n",
        )
        .unwrap();
        let config = parse_benchmark(&path).unwrap();
        assert_eq!(config.dataset, dir.path().join("data.json"));
        assert_eq!(config.output_dir, dir.path().join("results"));
    }

    #[test]
    fn test_parse_file_not_found() {
        let err = parse_benchmark(Path::new("/nonexistent/bench.yaml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Failed to read benchmark file"));
    }
}
