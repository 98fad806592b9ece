use crate::{
    bundle::Format,
    logger::{Property, Trigger},
    problem::{ProblemId, ProblemType},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io::Error, path::PathBuf, str::FromStr};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Problem {problem} is not registered for problem type {problem_type}")]
    UnknownProblem {
        problem: ProblemId,
        problem_type: ProblemType,
    },
    #[error("Problem {problem} does not support dimension {dimension}")]
    UnsupportedDimension { problem: ProblemId, dimension: usize },
    #[error("Problem {problem} requires a perfect square dimension, got {dimension}")]
    NonSquareDimension { problem: ProblemId, dimension: usize },
    #[error("Attribute {name} is not tracked by algorithm {algorithm}")]
    UnknownAttribute { name: String, algorithm: String },
    #[error("Preflight checks failed, see the log for details")]
    FailedPreflight,
    #[error("Config could not be parsed")]
    InvalidConfig(#[from] serde_yaml::Error),
    #[error("Config could not be read")]
    FileNotFound(#[from] Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    // the job grid: cartesian product of functions x instances x dimensions
    pub problems: ProblemsConfig,
    // independent runs per job, each followed by a reset of the problem
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub enforce_bounds: bool,
    // parameters of the built-in reference algorithm, ignored by library users
    #[serde(default)]
    pub algorithm: AlgorithmConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ProblemsConfig {
    #[serde(rename = "type", default = "default_problem_type")]
    pub problem_type: ProblemType,
    pub functions: Vec<ProblemId>,
    pub instances: Vec<u32>,
    pub dimensions: Vec<usize>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    // number of concurrent jobs, all available cores if unset, 1 runs sequentially
    pub threads: Option<usize>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub format: Format,
    #[serde(default = "default_triggers")]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub store_positions: bool,
    pub algorithm_name: Option<String>,
    #[serde(default = "default_algorithm_info")]
    pub algorithm_info: String,
    // static attributes stored once per experiment in the meta data
    #[serde(default)]
    pub experiment_attributes: BTreeMap<String, String>,
    // attributes read from the algorithm at the end of every run
    #[serde(default)]
    pub run_attributes: Vec<String>,
    // attributes sampled from the algorithm at every logged evaluation
    #[serde(default)]
    pub logged_attributes: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: Format::default(),
            triggers: default_triggers(),
            properties: Vec::new(),
            store_positions: false,
            algorithm_name: None,
            algorithm_info: default_algorithm_info(),
            experiment_attributes: BTreeMap::new(),
            run_attributes: Vec::new(),
            logged_attributes: Vec::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_folder_name")]
    pub folder_name: String,
    // merge the result with an already existing folder of the same name
    #[serde(default = "default_true")]
    pub merge: bool,
    #[serde(default = "default_true")]
    pub zip: bool,
    // remove the uncompressed result once it is archived
    #[serde(default)]
    pub remove_data: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            folder_name: default_folder_name(),
            merge: true,
            zip: true,
            remove_data: false,
        }
    }
}

impl OutputConfig {
    /// the canonical output folder `<directory>/<folder_name>`
    pub fn target(&self) -> PathBuf {
        self.directory.join(&self.folder_name)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct AlgorithmConfig {
    #[serde(default = "default_budget")]
    pub budget: usize,
    #[serde(default)]
    pub seed: u64,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            seed: 0,
        }
    }
}

impl FromStr for ExperimentConfig {
    type Err = ConfigErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_yaml::from_str(s)?)
    }
}

impl ExperimentConfig {
    /// read and parse a yaml config file
    pub fn load(path: &PathBuf) -> Result<Self, ConfigErrors> {
        std::fs::read_to_string(path)?.parse()
    }

    /// the configured degree of parallelism, resolving "all cores"
    pub fn threads(&self) -> usize {
        self.executor
            .threads
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }

    /// Validate the config and normalize it where possible. Returns true if an error was found.
    /// All problems are logged instead of failing on the first one to make debugging easier.
    pub fn preflight_checks(&mut self) -> bool {
        let mut contains_error = false;

        if self.problems.functions.is_empty() {
            error!("problems.functions is empty, unable to build a job grid");
            contains_error = true;
        }

        if self.problems.instances.is_empty() {
            error!("problems.instances is empty, unable to build a job grid");
            contains_error = true;
        }

        if self.problems.dimensions.is_empty() {
            error!("problems.dimensions is empty, unable to build a job grid");
            contains_error = true;
        }

        if self.problems.dimensions.contains(&0) {
            error!("problems.dimensions cannot contain 0");
            contains_error = true;
        }

        if self.repetitions == 0 {
            error!("repetitions cannot be 0, every job needs at least one run");
            contains_error = true;
        }

        if self.executor.threads == Some(0) {
            error!("executor.threads cannot be 0. Leave it unset to use all available cores");
            contains_error = true;
        }

        if self.output.folder_name.is_empty() || self.output.folder_name.contains('/') {
            error!(
                "output.folder_name ({:?}) must be a plain, non-empty folder name",
                self.output.folder_name
            );
            contains_error = true;
        }

        for trigger in self.logger.triggers.iter() {
            if let Trigger::Each(0) = trigger {
                error!("logger.triggers contains `each: 0`, the interval must be positive");
                contains_error = true;
            }
        }

        if !self.logger.enabled {
            if !self.logger.run_attributes.is_empty() || !self.logger.logged_attributes.is_empty()
            {
                warn!("Tracked attributes are configured but the logger is disabled, they will be ignored");
            }
            if self.output.zip {
                warn!("Nothing is written without a logger, output.zip is ignored");
                self.output.zip = false;
            }
        } else if self.logger.triggers.is_empty() {
            warn!("logger.triggers is empty. Only the last evaluation of every run will be logged");
        }

        if self.output.remove_data && !self.output.zip {
            warn!("output.remove_data is set without output.zip. Data is only removed once it is archived, the option is ignored");
            self.output.remove_data = false;
        }

        if self.output.merge && self.output.target().is_dir() {
            warn!(
                "There is already a folder named {} and output.merge is set. The results of this experiment will be merged with the contents of this folder",
                self.output.target().to_string_lossy()
            );
        }

        // duplicated axis values would dispatch the same job twice
        let functions = self.problems.functions.iter().cloned().unique().collect_vec();
        let instances = self.problems.instances.iter().copied().unique().collect_vec();
        let dimensions = self.problems.dimensions.iter().copied().unique().collect_vec();

        if functions.len() != self.problems.functions.len()
            || instances.len() != self.problems.instances.len()
            || dimensions.len() != self.problems.dimensions.len()
        {
            warn!("The job grid contains duplicated values, they are only run once");
            self.problems.functions = functions;
            self.problems.instances = instances;
            self.problems.dimensions = dimensions;
        }

        contains_error
    }
}

fn default_true() -> bool {
    true
}

fn default_repetitions() -> usize {
    1
}

fn default_budget() -> usize {
    1000
}

fn default_problem_type() -> ProblemType {
    ProblemType::Real
}

fn default_triggers() -> Vec<Trigger> {
    vec![Trigger::OnImprovement]
}

fn default_algorithm_info() -> String {
    "algorithm_info".to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from("./")
}

fn default_folder_name() -> String {
    "ioh_data".to_string()
}
