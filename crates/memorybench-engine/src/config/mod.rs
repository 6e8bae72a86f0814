//! Benchmark configuration: YAML types, parsing and validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_benchmark, parse_benchmark_str};
pub use types::BenchmarkConfig;
pub use validator::validate_benchmark;
