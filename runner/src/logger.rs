mod analyzer;

pub use analyzer::{Analyzer, AnalyzerSettings};

use crate::{bundle::meta::MetaError, problem::MetaData};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Failed to write logger output")]
    Io(#[from] io::Error),
    #[error("Failed to update meta data")]
    Meta(#[from] MetaError),
}

/// everything known about a single evaluation
#[derive(Debug, Clone, Copy)]
pub struct LogInfo<'a> {
    pub evaluations: usize,
    pub raw_y: f64,
    pub y: f64,
    pub best_y: f64,
    pub has_improved: bool,
    pub violation: f64,
    pub penalty: f64,
    pub x: &'a [f64],
}

/// when an evaluation is written to the data file
///
/// Written as `always`, `on_improvement` or `{each: n}` in the configuration.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(from = "TriggerRepr", into = "TriggerRepr")]
pub enum Trigger {
    Always,
    OnImprovement,
    /// every n-th evaluation
    Each(usize),
}

#[derive(Deserialize, Serialize, Clone, Copy)]
#[serde(untagged)]
enum TriggerRepr {
    Named(NamedTrigger),
    Each { each: usize },
}

#[derive(Deserialize, Serialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum NamedTrigger {
    Always,
    OnImprovement,
}

impl From<TriggerRepr> for Trigger {
    fn from(repr: TriggerRepr) -> Self {
        match repr {
            TriggerRepr::Named(NamedTrigger::Always) => Self::Always,
            TriggerRepr::Named(NamedTrigger::OnImprovement) => Self::OnImprovement,
            TriggerRepr::Each { each } => Self::Each(each),
        }
    }
}

impl From<Trigger> for TriggerRepr {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Always => Self::Named(NamedTrigger::Always),
            Trigger::OnImprovement => Self::Named(NamedTrigger::OnImprovement),
            Trigger::Each(each) => Self::Each { each },
        }
    }
}

impl Trigger {
    pub fn fires(&self, info: &LogInfo<'_>) -> bool {
        match self {
            Self::Always => true,
            Self::OnImprovement => info.has_improved,
            Self::Each(interval) => *interval > 0 && info.evaluations % interval == 0,
        }
    }
}

/// optional data file column
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    BestY,
    Violation,
    Penalty,
}

impl Property {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BestY => "raw_y_best",
            Self::Violation => "violation",
            Self::Penalty => "penalty",
        }
    }

    pub fn value(&self, info: &LogInfo<'_>) -> f64 {
        match self {
            Self::BestY => info.best_y,
            Self::Violation => info.violation,
            Self::Penalty => info.penalty,
        }
    }
}

/// The logger contract: attached to a problem, it observes every evaluation and persists
/// its records below `output_directory`.
pub trait Logger: Send {
    fn attach_problem(&mut self, problem: &MetaData);

    fn log(&mut self, info: &LogInfo<'_>);

    /// values of the run attributes for the run that is about to end
    fn record_run_attributes(&mut self, _attributes: BTreeMap<String, f64>) {}

    /// end of the current run
    fn reset(&mut self);

    /// write everything that is still pending; deferred write errors surface here
    fn close(&mut self) -> Result<(), LoggerError>;

    fn output_directory(&self) -> &Path;
}
