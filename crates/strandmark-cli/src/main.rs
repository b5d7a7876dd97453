//! The strandmark CLI, the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use strandmark_core::model::Level;

mod commands;

#[derive(Parser)]
#[command(
    name = "strandmark",
    version,
    about = "Adaptive assessment scoring and progression engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config, dataset, answers and rubric file
    Init,

    /// Validate dataset and rubric TOML files
    Validate {
        /// Path to a dataset file or directory
        #[arg(long)]
        dataset: PathBuf,

        /// Rubric file to check as well
        #[arg(long)]
        rubrics: Option<PathBuf>,
    },

    /// Score a file of answers without block progression
    Score {
        /// Path to a dataset file or directory
        #[arg(long)]
        dataset: PathBuf,

        /// Answers file with `[[answers]]` entries
        #[arg(long)]
        answers: PathBuf,

        /// Max concurrent evaluations
        #[arg(long, default_value = "4")]
        parallelism: usize,

        /// Short-answer grader from the config (local scoring if unset)
        #[arg(long)]
        grader: Option<String>,

        /// Write the batch report as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Work through one question block with scripted answers
    Simulate {
        /// Path to a dataset file or directory
        #[arg(long)]
        dataset: PathBuf,

        /// Answers file; repeated entries for a question are used as retries
        #[arg(long)]
        answers: PathBuf,

        /// Learning path
        #[arg(long, default_value = "default")]
        path: String,

        /// Strand id
        #[arg(long)]
        strand: String,

        /// Block level: 2, 4, 6 or 8
        #[arg(long)]
        level: Level,

        /// Continue as soon as feedback is shown instead of waiting out the delay
        #[arg(long)]
        instant: bool,

        /// Progress snapshot to resume from and update
        #[arg(long)]
        progress: Option<PathBuf>,

        /// Short-answer grader from the config (local scoring if unset)
        #[arg(long)]
        grader: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Grade a written artifact against a strand rubric
    Grade {
        /// Rubric TOML file
        #[arg(long)]
        rubrics: PathBuf,

        /// Learning path
        #[arg(long, default_value = "default")]
        path: String,

        /// Strand id
        #[arg(long)]
        strand: String,

        /// Text or HTML artifact to grade
        #[arg(long)]
        artifact: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Progress snapshot to record the result in
        #[arg(long)]
        progress: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show strand progress and badges from a snapshot
    Progress {
        /// Progress snapshot JSON
        #[arg(long)]
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("strandmark=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { dataset, rubrics } => commands::validate::execute(dataset, rubrics),
        Commands::Score {
            dataset,
            answers,
            parallelism,
            grader,
            output,
            config,
        } => commands::score::execute(dataset, answers, parallelism, grader, output, config).await,
        Commands::Simulate {
            dataset,
            answers,
            path,
            strand,
            level,
            instant,
            progress,
            grader,
            config,
        } => {
            commands::simulate::execute(commands::simulate::SimulateArgs {
                dataset,
                answers,
                path,
                strand,
                level,
                instant,
                progress,
                grader,
                config,
            })
            .await
        }
        Commands::Grade {
            rubrics,
            path,
            strand,
            artifact,
            format,
            progress,
            config,
        } => commands::grade::execute(rubrics, path, strand, artifact, format, progress, config),
        Commands::Progress { snapshot } => commands::progress::execute(snapshot),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
