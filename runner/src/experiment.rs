use crate::{
    algorithm::Algorithm,
    archive::{ArchiveError, Archiver},
    config::{ConfigErrors, ExperimentConfig},
    executors::{ExecutorError, JobFailure, LocalExecutor, RunSettings},
    grid::JobGrid,
    merge::{MergeEngine, MergeError},
    problem::{Bounds, OptimizationType, ProblemId, ProblemRegistry},
};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Invalid experiment")]
    Config(#[from] ConfigErrors),
    #[error("Failed to execute jobs")]
    Executor(#[from] ExecutorError),
    #[error("Job could not persist its results")]
    Job(#[from] JobFailure),
    #[error("Failed to merge results, temporary bundles are left in place")]
    Merge(#[from] MergeError),
    #[error("Failed to archive results")]
    Archive(#[from] ArchiveError),
}

/// outcome of a complete experiment
#[derive(Debug)]
pub struct ExperimentReport {
    /// number of dispatched jobs
    pub jobs: usize,
    /// jobs whose algorithm failed, their completed repetitions are part of the bundle
    pub failures: Vec<JobFailure>,
    /// the final bundle, `None` without logging or once it was removed after archiving
    pub bundle: Option<PathBuf>,
    pub archive: Option<PathBuf>,
}

/// An algorithm benchmarked on the grid of an [`ExperimentConfig`].
pub struct Experiment<A> {
    algorithm: A,
    config: ExperimentConfig,
    registry: ProblemRegistry,
}

impl<A: Algorithm> Experiment<A> {
    /// Validate the configuration against the registry and the algorithm. Every problem of
    /// the grid and every tracked attribute is checked before anything runs.
    pub fn new(
        algorithm: A,
        mut config: ExperimentConfig,
        registry: ProblemRegistry,
    ) -> Result<Self, ConfigErrors> {
        if config.preflight_checks() {
            return Err(ConfigErrors::FailedPreflight);
        }

        let experiment = Self {
            algorithm,
            config,
            registry,
        };
        experiment.validate()?;

        Ok(experiment)
    }

    fn validate(&self) -> Result<(), ConfigErrors> {
        let grid = self.grid();
        for key in grid.iter() {
            self.registry
                .validate(grid.problem_type, &key.function, key.dimension)?;
        }

        let accessors = A::accessors();
        let logger = &self.config.logger;
        let unknown = logger
            .run_attributes
            .iter()
            .find(|name| !accessors.has_run_attribute(name))
            .or_else(|| {
                logger
                    .logged_attributes
                    .iter()
                    .find(|name| !accessors.has_watched_attribute(name))
            });

        match unknown {
            Some(name) => Err(ConfigErrors::UnknownAttribute {
                name: name.clone(),
                algorithm: self.algorithm.name(),
            }),
            None => Ok(()),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn grid(&self) -> JobGrid {
        JobGrid::new(&self.config.problems, self.config.repetitions)
    }

    /// Wrap `function` as a problem of the configured type and add it to the grid.
    /// Returns the id it was registered under.
    pub fn add_custom_problem(
        &mut self,
        name: &str,
        optimization_type: OptimizationType,
        bounds: Bounds,
        function: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
    ) -> u32 {
        let id = self.registry.wrap(
            name,
            self.config.problems.problem_type,
            optimization_type,
            bounds,
            Arc::new(function),
        );

        let key = ProblemId::Id(id);
        if !self.config.problems.functions.contains(&key) {
            self.config.problems.functions.push(key);
        }

        id
    }

    /// Run every job, then merge, archive and clean up as configured.
    #[instrument(skip(self), fields(algorithm = %self.algorithm.name()), level = "info")]
    pub fn run(&self) -> Result<ExperimentReport, ExperimentError> {
        let grid = self.grid();
        let output = &self.config.output;
        let engine = MergeEngine::new(&output.directory, &output.folder_name);
        let executor =
            LocalExecutor::new(self.config.threads(), &output.directory, &output.folder_name);

        // sequential runs write straight into the result, merging into it if requested
        let target = match output.merge {
            true => engine.target(),
            false => engine.free_target(),
        };
        let settings = RunSettings::new(&self.config, self.algorithm.name());

        info!(jobs = grid.len(), repetitions = grid.repetitions, "Starting experiment");
        let (failures, fatal): (Vec<_>, Vec<_>) = executor
            .execute(&grid, &self.algorithm, &self.registry, &settings, &target)?
            .into_iter()
            .partition(|failure| failure.error.is_isolated());

        // write errors mean the bundles are incomplete, merging them would hide that
        if let Some(failure) = fatal.into_iter().next() {
            return Err(failure.into());
        }
        if !failures.is_empty() {
            warn!(
                "{} of {} jobs failed, their completed repetitions are kept",
                failures.len(),
                grid.len()
            );
        }

        let mut report = ExperimentReport {
            jobs: grid.len(),
            failures,
            bundle: None,
            archive: None,
        };

        if !self.config.logger.enabled {
            return Ok(report);
        }

        report.bundle = if executor.is_sequential() && !output.merge {
            target.is_dir().then_some(target)
        } else {
            engine.merge(output.merge)?
        };

        if let (true, Some(bundle)) = (output.zip, report.bundle.as_ref()) {
            report.archive = Some(Archiver::new(bundle).archive(output.remove_data)?);
            if output.remove_data {
                report.bundle = None;
            }
        }

        info!(bundle = ?report.bundle, archive = ?report.archive, "Experiment finished");

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::RandomSearch;

    fn config(yaml: &str) -> ExperimentConfig {
        yaml.parse().unwrap()
    }

    #[test]
    fn unknown_problems_fail_before_running() {
        let result = Experiment::new(
            RandomSearch::new(10, 0),
            config("problems: {functions: [99], instances: [1], dimensions: [2]}"),
            ProblemRegistry::default(),
        );

        assert!(matches!(result, Err(ConfigErrors::UnknownProblem { .. })));
    }

    #[test]
    fn non_square_dimensions_are_rejected() {
        let result = Experiment::new(
            RandomSearch::new(10, 0),
            config("problems: {type: integer, functions: [NQueens], instances: [1], dimensions: [8]}"),
            ProblemRegistry::default(),
        );

        assert!(matches!(result, Err(ConfigErrors::NonSquareDimension { .. })));
    }

    #[test]
    fn unknown_attributes_are_rejected() {
        let result = Experiment::new(
            RandomSearch::new(10, 0),
            config(
                "problems: {functions: [1], instances: [1], dimensions: [2]}\nlogger: {logged_attributes: [temperature]}",
            ),
            ProblemRegistry::default(),
        );

        assert!(matches!(
            result,
            Err(ConfigErrors::UnknownAttribute { ref name, .. }) if name == "temperature"
        ));
    }

    #[test]
    fn failed_preflight() {
        let result = Experiment::new(
            RandomSearch::new(10, 0),
            config("problems: {functions: [1], instances: [], dimensions: [2]}"),
            ProblemRegistry::default(),
        );

        assert!(matches!(result, Err(ConfigErrors::FailedPreflight)));
    }

    #[test]
    fn custom_problems_join_the_grid() {
        let mut experiment = Experiment::new(
            RandomSearch::new(10, 0),
            config("problems: {functions: [1], instances: [1], dimensions: [2]}"),
            ProblemRegistry::default(),
        )
        .unwrap();

        let id = experiment.add_custom_problem(
            "Sum",
            OptimizationType::Minimization,
            Bounds::new(-1.0, 1.0),
            |x| x.iter().sum(),
        );

        assert_eq!(id, 4);
        assert_eq!(experiment.grid().len(), 2);
        assert_eq!(
            experiment.config().problems.functions,
            vec![ProblemId::Id(1), ProblemId::Id(4)]
        );
    }
}
