mod context;
mod local;

pub use context::{RunContext, RunSettings};
pub use local::LocalExecutor;

use crate::{algorithm::AlgorithmError, config::ConfigErrors, grid::JobKey, logger::LoggerError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to start the worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// reason a single job stopped before finishing all of its repetitions
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Algorithm failed: {0}")]
    Algorithm(#[from] AlgorithmError),
    #[error("Algorithm panicked: {0}")]
    Panicked(String),
    #[error("Failed to create the problem")]
    Problem(#[from] ConfigErrors),
    #[error("Failed to write the results")]
    Logger(#[from] LoggerError),
}

impl JobError {
    /// failures of the algorithm only affect their own job, everything else aborts the experiment
    pub fn is_isolated(&self) -> bool {
        matches!(self, Self::Algorithm(_) | Self::Panicked(_))
    }
}

/// entry of the failure ledger kept by the executor
#[derive(Error, Debug)]
#[error("Job {index} ({key}) failed after {completed} repetitions: {error}")]
pub struct JobFailure {
    pub index: usize,
    pub key: JobKey,
    pub completed: usize,
    #[source]
    pub error: JobError,
}
