use super::Format;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("Failed to access meta data file")]
    Io(#[from] io::Error),
    #[error("Failed to (de)serialize structured meta data")]
    Json(#[from] serde_json::Error),
    #[error("Cannot combine {existing} meta data with {incoming} meta data")]
    IncompatibleFormats { existing: Format, incoming: Format },
    #[error("{0:?} is not a meta data file")]
    UnknownFormat(PathBuf),
}

/// A meta data file in one of the two on-disk formats.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaFile {
    Legacy(LegacyInfo),
    Structured(ExperimentInfo),
}

impl MetaFile {
    pub fn format(&self) -> Format {
        match self {
            Self::Legacy(_) => Format::Legacy,
            Self::Structured(_) => Format::Structured,
        }
    }

    pub fn load(path: &Path) -> Result<Self, MetaError> {
        let format = Format::of(path).ok_or_else(|| MetaError::UnknownFormat(path.into()))?;
        let content = fs::read_to_string(path)?;

        Ok(match format {
            Format::Legacy => Self::Legacy(LegacyInfo { text: content }),
            Format::Structured => Self::Structured(serde_json::from_str(&content)?),
        })
    }

    pub fn store(&self, path: &Path) -> Result<(), MetaError> {
        match self {
            Self::Legacy(info) => fs::write(path, &info.text)?,
            Self::Structured(info) => {
                let mut content = serde_json::to_string_pretty(info)?;
                content.push('\n');
                fs::write(path, content)?
            }
        }

        Ok(())
    }

    /// Combine `other` into `self`: legacy files are appended, structured files are merged
    /// per scenario. Runs are only ever appended, never reordered or deduplicated.
    pub fn absorb(&mut self, other: MetaFile) -> Result<(), MetaError> {
        match (self, other) {
            (Self::Legacy(target), Self::Legacy(source)) => {
                target.append(source);
                Ok(())
            }
            (Self::Structured(target), Self::Structured(source)) => {
                target.extend(source);
                Ok(())
            }
            (target, source) => Err(MetaError::IncompatibleFormats {
                existing: target.format(),
                incoming: source.format(),
            }),
        }
    }

    /// number of recorded runs per dimension
    pub fn runs_per_dimension(&self) -> BTreeMap<usize, usize> {
        match self {
            Self::Legacy(info) => info.runs_per_dimension(),
            Self::Structured(info) => {
                info.scenarios
                    .iter()
                    .fold(BTreeMap::new(), |mut counts, scenario| {
                        *counts.entry(scenario.dimension).or_default() += scenario.runs.len();
                        counts
                    })
            }
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs_per_dimension().values().sum()
    }
}

/// Line based meta data: per dimension a header line, a `%` separator and the data file path
/// followed by one `, <instance>:<evals>|<best>[;attribute]*` entry per run.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct LegacyInfo {
    pub text: String,
}

impl LegacyInfo {
    /// append the lines of `other`, separated by a blank line
    pub fn append(&mut self, other: LegacyInfo) {
        if self.text.is_empty() {
            self.text = other.text;
            return;
        }

        if !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.text.push('\n');
        self.text.push_str(&other.text);
    }

    /// add one block for a dimension
    pub fn push_block(&mut self, header: &str, data_path: &str, runs: &[String]) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }

        self.text.push_str(header);
        self.text.push_str("\n%\n");
        self.text.push_str(data_path);
        for run in runs {
            self.text.push_str(", ");
            self.text.push_str(run);
        }
        self.text.push('\n');
    }

    fn runs_per_dimension(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        let mut dimension = None;
        let mut after_separator = false;

        for line in self.text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if line.starts_with("suite") {
                dimension = parse_dimension(line);
                after_separator = false;
            } else if line == "%" {
                after_separator = true;
            } else if after_separator {
                if let Some(dimension) = dimension {
                    // the first entry is the data file path
                    *counts.entry(dimension).or_default() += line.split(", ").skip(1).count();
                }
                after_separator = false;
            }
        }

        counts
    }
}

fn parse_dimension(header: &str) -> Option<usize> {
    let (_, rest) = header.split_once("DIM = ")?;
    rest.split(',').next()?.trim().parse().ok()
}

/// Structured meta data of one problem, listing its scenarios (one per dimension).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExperimentInfo {
    pub version: String,
    pub suite: String,
    pub function_id: u32,
    pub function_name: String,
    pub maximization: bool,
    pub algorithm: AlgorithmInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experiment_attributes: Vec<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    pub scenarios: Vec<ScenarioInfo>,
}

impl ExperimentInfo {
    /// extend scenarios of matching dimension, append the others
    pub fn extend(&mut self, other: ExperimentInfo) {
        for scenario in other.scenarios {
            match self
                .scenarios
                .iter_mut()
                .find(|target| target.dimension == scenario.dimension)
            {
                Some(target) => target.runs.extend(scenario.runs),
                None => self.scenarios.push(scenario),
            }
        }
    }

    /// scenario for `dimension`, created on first use
    pub fn scenario_mut(&mut self, dimension: usize, path: &str) -> &mut ScenarioInfo {
        let index = match self
            .scenarios
            .iter()
            .position(|scenario| scenario.dimension == dimension)
        {
            Some(index) => index,
            None => {
                self.scenarios.push(ScenarioInfo {
                    dimension,
                    path: path.to_string(),
                    runs: Vec::new(),
                });
                self.scenarios.len() - 1
            }
        };

        &mut self.scenarios[index]
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AlgorithmInfo {
    pub name: String,
    pub info: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScenarioInfo {
    pub dimension: usize,
    pub path: String,
    pub runs: Vec<RunInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunInfo {
    pub instance: u32,
    pub evals: usize,
    pub best: BestPoint,
    /// run attributes, kept apart so their names never clash with the fields above
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BestPoint {
    pub evals: usize,
    pub y: f64,
    #[serde(default)]
    pub x: Vec<f64>,
}
