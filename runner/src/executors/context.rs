use super::{JobError, JobFailure};
use crate::{
    algorithm::{Accessors, Algorithm},
    config::{ExperimentConfig, LoggerConfig},
    grid::JobKey,
    logger::{Analyzer, AnalyzerSettings},
    problem::{Problem, ProblemRegistry, ProblemType},
};
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    path::PathBuf,
};
use tracing::{debug, warn};

/// weight of the quadratic penalty applied when bounds are enforced
pub const BOUND_PENALTY_WEIGHT: f64 = 1.0;

/// settings shared by every run context of an experiment
#[derive(Clone, Debug)]
pub struct RunSettings {
    pub problem_type: ProblemType,
    pub repetitions: usize,
    pub enforce_bounds: bool,
    /// `None` disables logging entirely
    pub logger: Option<LoggerConfig>,
    pub algorithm_name: String,
}

impl RunSettings {
    pub fn new(config: &ExperimentConfig, algorithm_name: String) -> Self {
        Self {
            problem_type: config.problems.problem_type,
            repetitions: config.repetitions,
            enforce_bounds: config.enforce_bounds,
            logger: config.logger.enabled.then(|| config.logger.clone()),
            algorithm_name: config
                .logger
                .algorithm_name
                .clone()
                .unwrap_or(algorithm_name),
        }
    }
}

/// Executes all repetitions of one job on its own copy of the algorithm.
pub struct RunContext<'a, A> {
    pub index: usize,
    pub key: JobKey,
    algorithm: A,
    registry: &'a ProblemRegistry,
    settings: &'a RunSettings,
    /// bundle owned by this job
    output: PathBuf,
}

impl<'a, A: Algorithm> RunContext<'a, A> {
    pub fn new(
        index: usize,
        key: JobKey,
        algorithm: &A,
        registry: &'a ProblemRegistry,
        settings: &'a RunSettings,
        output: PathBuf,
    ) -> Self {
        Self {
            index,
            key,
            algorithm: algorithm.clone(),
            registry,
            settings,
            output,
        }
    }

    fn fail(&self, completed: usize, error: JobError) -> JobFailure {
        JobFailure {
            index: self.index,
            key: self.key.clone(),
            completed,
            error,
        }
    }

    fn analyzer(
        &self,
        config: &LoggerConfig,
        accessors: &Accessors<A>,
    ) -> Result<Analyzer, JobError> {
        let mut analyzer = Analyzer::new(AnalyzerSettings {
            root: self.output.clone(),
            format: config.format,
            algorithm_name: self.settings.algorithm_name.clone(),
            algorithm_info: config.algorithm_info.clone(),
            triggers: config.triggers.clone(),
            properties: config.properties.clone(),
            store_positions: config.store_positions,
        })?;

        analyzer.set_experiment_attributes(config.experiment_attributes.clone());
        analyzer.add_run_attributes(&config.run_attributes);
        analyzer.watch(accessors.watch_handles(&self.algorithm, &config.logged_attributes));

        Ok(analyzer)
    }

    /// run all repetitions, returning how many of them completed
    pub fn run(mut self) -> Result<usize, JobFailure> {
        let mut problem = self
            .registry
            .create(
                self.settings.problem_type,
                &self.key.function,
                self.key.instance,
                self.key.dimension,
            )
            .map_err(|error| self.fail(0, error.into()))?;

        if self.settings.enforce_bounds {
            problem.enforce_bounds(BOUND_PENALTY_WEIGHT);
        }

        let accessors = A::accessors();
        if let Some(config) = self.settings.logger.as_ref() {
            let analyzer = self
                .analyzer(config, &accessors)
                .map_err(|error| self.fail(0, error))?;
            problem.attach_logger(Box::new(analyzer));
        }

        let (completed, outcome) = self.repeat(&mut problem, &accessors);

        // an unfinished repetition is dropped by the logger, completed ones are kept
        if let Some(mut logger) = problem.detach_logger() {
            logger
                .close()
                .map_err(|error| self.fail(completed, error.into()))?;
        }

        match outcome {
            Ok(()) => Ok(completed),
            Err(error) => Err(self.fail(completed, error)),
        }
    }

    fn repeat(
        &mut self,
        problem: &mut dyn Problem,
        accessors: &Accessors<A>,
    ) -> (usize, Result<(), JobError>) {
        let run_attributes = self
            .settings
            .logger
            .as_ref()
            .map(|config| config.run_attributes.clone())
            .unwrap_or_default();

        for repetition in 0..self.settings.repetitions {
            let algorithm = &mut self.algorithm;
            let result = match catch_unwind(AssertUnwindSafe(|| algorithm.run(problem))) {
                Ok(result) => result.map_err(JobError::from),
                Err(panic) => Err(JobError::Panicked(panic_message(panic))),
            };

            if let Err(error) = result {
                warn!(job = self.index, repetition, error = %error, "Aborting remaining repetitions");
                return (repetition, Err(error));
            }

            if let Some(logger) = problem.logger_mut() {
                logger.record_run_attributes(
                    accessors.read_run_attributes(&self.algorithm, &run_attributes),
                );
            }
            problem.reset();
            debug!(job = self.index, repetition, "Finished repetition");
        }

        (self.settings.repetitions, Ok(()))
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithm::{AlgorithmError, RandomSearch},
        bundle::meta::MetaFile,
        problem::ProblemId,
    };

    #[derive(Clone)]
    struct FailsOnSecondRun {
        runs: usize,
    }

    impl Algorithm for FailsOnSecondRun {
        fn name(&self) -> String {
            "fails".into()
        }

        fn run(&mut self, problem: &mut dyn Problem) -> Result<(), AlgorithmError> {
            self.runs += 1;
            problem.evaluate(&vec![0.0; problem.meta_data().n_variables]);
            if self.runs == 2 {
                return Err(AlgorithmError::new("second run"));
            }
            Ok(())
        }
    }

    #[derive(Clone)]
    struct Panics;

    impl Algorithm for Panics {
        fn name(&self) -> String {
            "panics".into()
        }

        fn run(&mut self, _problem: &mut dyn Problem) -> Result<(), AlgorithmError> {
            panic!("boom")
        }
    }

    fn settings(repetitions: usize) -> RunSettings {
        let config: ExperimentConfig =
            "problems: {functions: [1], instances: [1], dimensions: [2]}"
                .parse()
                .unwrap();

        RunSettings {
            repetitions,
            ..RunSettings::new(&config, "test".into())
        }
    }

    fn key() -> JobKey {
        JobKey {
            function: ProblemId::Id(1),
            instance: 1,
            dimension: 2,
        }
    }

    #[test]
    fn completes_all_repetitions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProblemRegistry::default();
        let settings = settings(3);
        let output = dir.path().join("bundle");

        let context = RunContext::new(1, key(), &RandomSearch::new(5, 0), &registry, &settings, output.clone());
        assert_eq!(context.run().unwrap(), 3);

        let meta = MetaFile::load(&output.join("IOHprofiler_f1_Sphere.info")).unwrap();
        assert_eq!(meta.run_count(), 3);
    }

    #[test]
    fn failing_run_keeps_completed_repetitions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProblemRegistry::default();
        let settings = settings(3);
        let output = dir.path().join("bundle");

        let failure = RunContext::new(4, key(), &FailsOnSecondRun { runs: 0 }, &registry, &settings, output.clone())
            .run()
            .unwrap_err();

        assert_eq!(failure.index, 4);
        assert_eq!(failure.completed, 1);
        assert!(failure.error.is_isolated());

        let meta = MetaFile::load(&output.join("IOHprofiler_f1_Sphere.info")).unwrap();
        assert_eq!(meta.run_count(), 1);
    }

    #[test]
    fn panics_are_caught() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProblemRegistry::default();
        let settings = settings(2);

        let failure = RunContext::new(1, key(), &Panics, &registry, &settings, dir.path().join("bundle"))
            .run()
            .unwrap_err();

        assert!(matches!(failure.error, JobError::Panicked(ref message) if message == "boom"));
        assert_eq!(failure.completed, 0);
    }

    #[test]
    fn job_clones_do_not_touch_the_original() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProblemRegistry::default();
        let settings = settings(3);
        let algorithm = FailsOnSecondRun { runs: 0 };

        let _ = RunContext::new(1, key(), &algorithm, &registry, &settings, dir.path().join("a")).run();
        let _ = RunContext::new(2, key(), &algorithm, &registry, &settings, dir.path().join("b")).run();

        assert_eq!(algorithm.runs, 0);
    }
}
