use clap::{Parser, Subcommand};
use gridbench::{
    Archiver, Experiment, ExperimentConfig, MergeEngine, ProblemRegistry, RandomSearch,
};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_unwrap::ResultExt;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the random search reference algorithm on the configured grid
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// overrides executor.threads
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Merge temporary bundles left behind by an interrupted or failed run
    Merge {
        #[arg(long)]
        directory: PathBuf,
        #[arg(long)]
        folder_name: String,
        /// keep numbered siblings of the folder separate
        #[arg(long)]
        no_consolidate: bool,
    },
    /// Compress a bundle into a zip archive next to it
    Archive {
        #[arg(long)]
        directory: PathBuf,
        #[arg(long)]
        folder_name: String,
        #[arg(long)]
        remove_data: bool,
    },
}

fn run(config: PathBuf, threads: Option<usize>) -> ExitCode {
    let mut config = ExperimentConfig::load(&config).unwrap_or_log();
    if threads.is_some() {
        config.executor.threads = threads;
    }

    let algorithm = RandomSearch::from_config(&config.algorithm);
    let experiment = match Experiment::new(algorithm, config, ProblemRegistry::default()) {
        Ok(experiment) => experiment,
        Err(error) => {
            error!("{error}");
            return ExitCode::FAILURE;
        }
    };

    match experiment.run() {
        Ok(report) => {
            for failure in report.failures.iter() {
                warn!("{failure}");
            }
            info!(
                bundle = ?report.bundle,
                archive = ?report.archive,
                "Finished {} jobs with {} failures",
                report.jobs,
                report.failures.len()
            );

            match report.failures.is_empty() {
                true => ExitCode::SUCCESS,
                false => ExitCode::FAILURE,
            }
        }
        Err(error) => {
            error!(error = ?error, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, threads } => run(config, threads),
        Command::Merge {
            directory,
            folder_name,
            no_consolidate,
        } => match MergeEngine::new(&directory, &folder_name).merge(!no_consolidate) {
            Ok(Some(bundle)) => {
                info!(bundle = ?bundle, "Merged");
                ExitCode::SUCCESS
            }
            Ok(None) => {
                info!("Nothing to merge");
                ExitCode::SUCCESS
            }
            Err(error) => {
                error!(error = ?error, "{error}");
                ExitCode::FAILURE
            }
        },
        Command::Archive {
            directory,
            folder_name,
            remove_data,
        } => match Archiver::new(&directory.join(folder_name)).archive(remove_data) {
            Ok(archive) => {
                info!(archive = ?archive, "Archived");
                ExitCode::SUCCESS
            }
            Err(error) => {
                error!(error = ?error, "{error}");
                ExitCode::FAILURE
            }
        },
    }
}
