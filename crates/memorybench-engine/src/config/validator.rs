//! Semantic validation for parsed benchmark configuration values.

use anyhow::{bail, Result};

use crate::config::types::BenchmarkConfig;

/// Validate a parsed benchmark configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_benchmark(config: &BenchmarkConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported benchmark version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.benchmark.trim().is_empty() {
        errors.push("Benchmark name must not be empty".to_string());
    }

    if config.dataset.as_os_str().is_empty() {
        errors.push("Dataset path must not be empty".to_string());
    }

    for (section, kind) in [
        ("provider", &config.provider.kind),
        ("answer_model", &config.answer_model.kind),
        ("judge", &config.judge.kind),
    ] {
        if kind.trim().is_empty() {
            errors.push(format!("{section}.kind must not be empty"));
        }
    }

    if !(config.provider.config.is_null() || config.provider.config.is_object()) {
        errors.push("provider.config must be a mapping".to_string());
    }

    if config.search.limit == 0 {
        errors.push("search.limit must be at least 1".to_string());
    }

    if config.output_dir.as_os_str().is_empty() {
        errors.push("output_dir must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Benchmark validation failed:\n  - {}", errors.join("\n  - "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_benchmark_str;

    fn valid_yaml() -> &'static str {
        r#"
version: "1.0"
benchmark: longmemeval-s
dataset: questions.json
provider:
  kind: in_memory
  config:
    index_delay_ms: 10
"#
    }

    #[test]
    fn test_valid_config_passes() {
        let config = parse_benchmark_str(valid_yaml()).unwrap();
        assert!(validate_benchmark(&config).is_ok());
    }

    #[test]
    fn test_wrong_version_fails() {
        let yaml = valid_yaml().replace("\"1.0\"", "\"2.0\"");
        let config = parse_benchmark_str(&yaml).unwrap();
        let err = validate_benchmark(&config).unwrap_err().to_string();
        assert!(err.contains("Unsupported benchmark version"));
    }

    #[test]
    fn test_all_errors_reported_together() {
        let yaml = r#"
version: "1.0"
benchmark: ""
dataset: questions.json
provider:
  kind: ""
  config: [1, 2]
search:
  limit: 0
"#;
        let config = parse_benchmark_str(yaml).unwrap();
        let err = validate_benchmark(&config).unwrap_err().to_string();
        assert!(err.contains("Benchmark name must not be empty"));
        assert!(err.contains("provider.kind must not be empty"));
        assert!(err.contains("provider.config must be a mapping"));
        assert!(err.contains("search.limit must be at least 1"));
    }
}
