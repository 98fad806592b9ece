//! Orchestration of benchmark experiments: a grid of problem configurations is executed
//! sequentially or on a local thread pool, every parallel job writing its own temporary
//! bundle, which are merged into one result and optionally archived afterwards.

pub mod algorithm;
pub mod archive;
pub mod bundle;
pub mod config;
pub mod executors;
pub mod experiment;
pub mod grid;
pub mod logger;
pub mod merge;
pub mod problem;

pub use algorithm::{Accessors, Algorithm, AlgorithmError, RandomSearch, Watch, WatchHandle};
pub use archive::{ArchiveError, Archiver};
pub use bundle::Format;
pub use config::{ConfigErrors, ExperimentConfig};
pub use executors::{JobError, JobFailure};
pub use experiment::{Experiment, ExperimentError, ExperimentReport};
pub use grid::{JobGrid, JobKey};
pub use merge::{MergeEngine, MergeError};
pub use problem::{
    BenchmarkProblem, Bounds, MetaData, OptimizationType, Problem, ProblemId, ProblemRegistry,
    ProblemType,
};
