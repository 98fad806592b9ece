use super::{ExecutorError, JobFailure, RunContext, RunSettings};
use crate::{
    algorithm::Algorithm,
    bundle,
    grid::{JobGrid, JobKey},
    problem::ProblemRegistry,
};
use parking_lot::FairMutex;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{debug, error, info, instrument};

/// Executor that works on a local thread pool
#[derive(Debug)]
pub struct LocalExecutor {
    threads: usize,
    directory: PathBuf,
    folder_name: String,
}

impl LocalExecutor {
    pub fn new(threads: usize, directory: &Path, folder_name: &str) -> Self {
        Self {
            threads: threads.max(1),
            directory: directory.to_path_buf(),
            folder_name: folder_name.to_string(),
        }
    }

    pub fn is_sequential(&self) -> bool {
        self.threads == 1
    }

    /// Bundle the job with `index` writes to. Parallel jobs own a temporary bundle keyed by
    /// their index, sequential jobs share `target`.
    pub fn output_of(&self, index: usize, target: &Path) -> PathBuf {
        if self.is_sequential() {
            target.to_path_buf()
        } else {
            bundle::temp_bundle(&self.directory, &self.folder_name, index)
        }
    }

    /// Execute every job of the grid and block until all of them returned.
    /// Failed jobs are collected in the returned ledger, ordered by job index.
    #[instrument(skip_all, fields(threads = self.threads, jobs = grid.len()), level = "info")]
    pub fn execute<A: Algorithm>(
        &self,
        grid: &JobGrid,
        algorithm: &A,
        registry: &ProblemRegistry,
        settings: &RunSettings,
        target: &Path,
    ) -> Result<Vec<JobFailure>, ExecutorError> {
        // general counters to provide progress
        let total = grid.len();
        let processed = AtomicU64::new(0);
        let failures = FairMutex::new(Vec::new());

        let process = |(index, key): (usize, JobKey)| {
            debug!("Processing job {index}: {key}");

            let output = self.output_of(index, target);
            if let Err(failure) =
                RunContext::new(index, key, algorithm, registry, settings, output).run()
            {
                error!(job = index, "{failure}");
                failures.lock().push(failure);
            }

            info!(
                "Done with {}/{}",
                processed.fetch_add(1, Ordering::SeqCst) + 1,
                total
            );
        };

        if self.is_sequential() {
            grid.jobs().for_each(process);
        } else {
            debug!("Starting thread pool with {} threads", self.threads);

            // NOTE: a local pool, the global one can only be configured once per process
            ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()?
                .install(|| grid.jobs().par_bridge().for_each(process));
        }

        info!("Done with processing");

        let mut failures = failures.into_inner();
        failures.sort_by_key(|failure| failure.index);

        Ok(failures)
    }
}
