mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use memorybench_types::phase::Phase;

#[derive(Parser)]
#[command(
    name = "memorybench",
    version,
    about = "Checkpointed, resumable benchmarks for memory providers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark, or resume one by run id
    Run {
        /// Path to benchmark YAML file
        config: PathBuf,
        /// Run id to create or resume (default: generated from the benchmark name)
        #[arg(long)]
        run_id: Option<String>,
        /// Only process these question ids (repeatable)
        #[arg(long = "question", value_name = "ID")]
        questions: Vec<String>,
        /// First phase to run
        #[arg(long)]
        from_phase: Option<Phase>,
        /// Last phase to run
        #[arg(long)]
        to_phase: Option<Phase>,
        /// Worker count for every phase, overriding the config
        #[arg(long)]
        concurrency: Option<u32>,
    },
    /// Show per-phase progress of a run
    Status {
        /// Path to benchmark YAML file
        config: PathBuf,
        #[arg(long)]
        run_id: String,
    },
    /// Build, write and print the report of a run
    Report {
        /// Path to benchmark YAML file
        config: PathBuf,
        #[arg(long)]
        run_id: String,
        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List runs in the checkpoint store
    Runs {
        /// Path to benchmark YAML file
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            config,
            run_id,
            questions,
            from_phase,
            to_phase,
            concurrency,
        } => {
            commands::run::execute(
                &config,
                commands::run::RunArgs {
                    run_id,
                    questions,
                    from_phase,
                    to_phase,
                    concurrency,
                },
            )
            .await
        }
        Commands::Status { config, run_id } => commands::status::execute(&config, &run_id),
        Commands::Report {
            config,
            run_id,
            json,
        } => commands::report::execute(&config, &run_id, json),
        Commands::Runs { config } => commands::runs::execute(&config),
    }
}
