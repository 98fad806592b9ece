use super::{LogInfo, Logger, LoggerError, Property, Trigger};
use crate::{
    algorithm::WatchHandle,
    bundle::{
        self,
        meta::{
            AlgorithmInfo, BestPoint, ExperimentInfo, LegacyInfo, MetaError, MetaFile, RunInfo,
        },
        Format,
    },
    problem::{MetaData, OptimizationType},
};
use itertools::Itertools;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, error, warn};

/// Everything needed to construct an [`Analyzer`].
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    /// bundle directory the analyzer owns, created on construction
    pub root: PathBuf,
    pub format: Format,
    pub algorithm_name: String,
    pub algorithm_info: String,
    pub triggers: Vec<Trigger>,
    pub properties: Vec<Property>,
    pub store_positions: bool,
}

/// meta data collected for one file, written on close
#[derive(Debug)]
enum Pending {
    Legacy(Vec<LegacyBlock>),
    Structured(ExperimentInfo),
}

#[derive(Debug)]
struct LegacyBlock {
    dimension: usize,
    header: String,
    data_path: String,
    runs: Vec<String>,
}

#[derive(Debug, Default)]
struct RunBuffer {
    rows: Vec<String>,
    // latest row that no trigger asked for, written when the run ends
    unwritten: Option<String>,
    evaluations: usize,
    best_y: f64,
    best_x: Vec<f64>,
    best_evaluations: usize,
    attributes: BTreeMap<String, f64>,
}

/// Logger producing output bundles in either meta data format.
///
/// Rows of a run are buffered and only written once the problem is reset, so a run that
/// is aborted halfway never shows up in the bundle. When the meta data file already exists
/// the new runs are merged into it.
#[derive(Debug)]
pub struct Analyzer {
    settings: AnalyzerSettings,
    experiment_attributes: BTreeMap<String, String>,
    run_attributes: Vec<String>,
    watched: Vec<(String, WatchHandle)>,
    problem: Option<MetaData>,
    run: RunBuffer,
    pending: BTreeMap<PathBuf, Pending>,
    deferred: Option<LoggerError>,
    closed: bool,
}

impl Analyzer {
    pub fn new(settings: AnalyzerSettings) -> Result<Self, LoggerError> {
        fs::create_dir_all(&settings.root)?;
        debug!(root = ?settings.root, format = %settings.format, "Created analyzer");

        Ok(Self {
            settings,
            experiment_attributes: BTreeMap::new(),
            run_attributes: Vec::new(),
            watched: Vec::new(),
            problem: None,
            run: RunBuffer::default(),
            pending: BTreeMap::new(),
            deferred: None,
            closed: false,
        })
    }

    fn started(&self) -> bool {
        if self.problem.is_some() {
            warn!("Cannot change attributes after the experiment has started");
        }
        self.problem.is_some()
    }

    /// static attributes stored once in the meta data
    pub fn set_experiment_attributes(&mut self, attributes: BTreeMap<String, String>) {
        if !self.started() {
            self.experiment_attributes = attributes;
        }
    }

    /// names of the attributes stored with every run
    pub fn add_run_attributes(&mut self, names: &[String]) {
        if !self.started() {
            self.run_attributes.extend(names.iter().cloned());
        }
    }

    /// attributes sampled into an extra column of every row
    pub fn watch(&mut self, handles: Vec<(String, WatchHandle)>) {
        if !self.started() {
            self.watched.extend(handles);
        }
    }

    fn columns(&self, n_variables: usize) -> Vec<String> {
        let mut columns = vec!["evaluations".to_string(), "raw_y".to_string()];
        columns.extend(self.settings.properties.iter().map(|p| p.name().to_string()));
        if self.settings.store_positions {
            columns.extend((0..n_variables).map(|i| format!("x{i}")));
        }
        columns.extend(self.watched.iter().map(|(name, _)| name.clone()));

        columns
    }

    fn header(&self, n_variables: usize) -> String {
        let columns = self.columns(n_variables);

        match self.settings.format {
            Format::Legacy => columns.iter().map(|c| format!("\"{c}\"")).join(" "),
            Format::Structured => columns.join(" "),
        }
    }

    fn row(&self, info: &LogInfo<'_>) -> String {
        let mut values = vec![info.evaluations.to_string(), format_value(info.raw_y)];
        values.extend(
            self.settings
                .properties
                .iter()
                .map(|p| format_value(p.value(info))),
        );
        if self.settings.store_positions {
            values.extend(info.x.iter().map(|x| format_value(*x)));
        }
        values.extend(self.watched.iter().map(|(_, w)| format_value(w.get())));

        values.join(" ")
    }

    fn meta_path(&self, problem: &MetaData) -> PathBuf {
        self.settings
            .root
            .join(bundle::meta_file_name(problem, self.settings.format))
    }

    fn legacy_header(&self, problem: &MetaData) -> String {
        let mut header = format!(
            "suite = \"{}\", funcId = {}, funcName = \"{}\", DIM = {}, maximization = \"{}\", algId = \"{}\", algInfo = \"{}\"",
            problem.problem_type,
            problem.problem_id,
            problem.name,
            problem.n_variables,
            match problem.optimization_type {
                OptimizationType::Maximization => 'T',
                OptimizationType::Minimization => 'F',
            },
            self.settings.algorithm_name,
            self.settings.algorithm_info,
        );

        for (key, value) in self.experiment_attributes.iter() {
            header.push_str(&format!(", {key} = \"{value}\""));
        }
        if !self.run_attributes.is_empty() {
            header.push_str(&format!(
                ", dynamicAttribute = \"{}\"",
                self.run_attributes.join("|")
            ));
        }

        header
    }

    fn experiment_info(&self, problem: &MetaData) -> ExperimentInfo {
        ExperimentInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            suite: problem.problem_type.to_string(),
            function_id: problem.problem_id,
            function_name: problem.name.clone(),
            maximization: problem.optimization_type == OptimizationType::Maximization,
            algorithm: AlgorithmInfo {
                name: self.settings.algorithm_name.clone(),
                info: self.settings.algorithm_info.clone(),
            },
            experiment_attributes: self
                .experiment_attributes
                .iter()
                .map(|(key, value)| BTreeMap::from([(key.clone(), value.clone())]))
                .collect(),
            run_attributes: self.run_attributes.clone(),
            attributes: self
                .settings
                .properties
                .iter()
                .map(|p| p.name().to_string())
                .chain(self.watched.iter().map(|(name, _)| name.clone()))
                .collect(),
            scenarios: Vec::new(),
        }
    }

    fn write_rows(&self, problem: &MetaData, rows: &[String]) -> Result<(), LoggerError> {
        let directory = self.settings.root.join(bundle::data_dir_name(problem));
        fs::create_dir_all(&directory)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(directory.join(bundle::data_file_name(problem)))?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{}", self.header(problem.n_variables))?;
        for row in rows {
            writeln!(writer, "{row}")?;
        }
        writer.flush()?;

        Ok(())
    }

    /// write the current run and record it in the meta data
    fn finish_run(&mut self) {
        let mut run = std::mem::take(&mut self.run);
        let Some(problem) = self.problem.clone() else {
            return;
        };
        if run.evaluations == 0 {
            return;
        }

        if let Some(row) = run.unwritten.take() {
            run.rows.push(row);
        }

        if let Err(error) = self.write_rows(&problem, &run.rows) {
            error!(error = ?error, "Failed to write run data");
            self.deferred.get_or_insert(error);
            return;
        }

        let path = self.meta_path(&problem);
        match self.pending.get_mut(&path) {
            Some(Pending::Legacy(blocks)) => {
                if let Some(block) = blocks
                    .iter_mut()
                    .rev()
                    .find(|block| block.dimension == problem.n_variables)
                {
                    let mut entry = format!(
                        "{}:{}|{}",
                        problem.instance,
                        run.evaluations,
                        format_value(run.best_y)
                    );
                    for name in self.run_attributes.iter() {
                        let value = run.attributes.get(name).copied().unwrap_or(f64::NAN);
                        entry.push_str(&format!(";{}", format_value(value)));
                    }
                    block.runs.push(entry);
                }
            }
            Some(Pending::Structured(info)) => {
                let attributes = self
                    .run_attributes
                    .iter()
                    .map(|name| {
                        let value = run.attributes.get(name).copied().unwrap_or(f64::NAN);
                        (name.clone(), Value::from(value))
                    })
                    .collect();

                info.scenario_mut(problem.n_variables, &bundle::relative_data_path(&problem))
                    .runs
                    .push(RunInfo {
                        instance: problem.instance,
                        evals: run.evaluations,
                        best: BestPoint {
                            evals: run.best_evaluations,
                            y: run.best_y,
                            x: run.best_x,
                        },
                        attributes,
                    });
            }
            None => error!(path = ?path, "Run finished without meta data for its problem"),
        }
    }

    fn store(&self, path: &Path, pending: &Pending) -> Result<(), LoggerError> {
        let incoming = match pending {
            Pending::Legacy(blocks) => {
                let mut info = LegacyInfo::default();
                for block in blocks.iter().filter(|block| !block.runs.is_empty()) {
                    info.push_block(&block.header, &block.data_path, &block.runs);
                }
                if info.text.is_empty() {
                    return Ok(());
                }
                MetaFile::Legacy(info)
            }
            Pending::Structured(info) => {
                let mut info = info.clone();
                info.scenarios.retain(|scenario| !scenario.runs.is_empty());
                if info.scenarios.is_empty() {
                    return Ok(());
                }
                MetaFile::Structured(info)
            }
        };

        // a bundle may only hold one format per problem
        let other = match incoming.format() {
            Format::Legacy => Format::Structured,
            Format::Structured => Format::Legacy,
        };
        if path.with_extension(other.extension()).exists() {
            return Err(MetaError::IncompatibleFormats {
                existing: other,
                incoming: incoming.format(),
            }
            .into());
        }

        if path.is_file() {
            let mut existing = MetaFile::load(path)?;
            existing.absorb(incoming)?;
            existing.store(path)?;
        } else {
            incoming.store(path)?;
        }

        Ok(())
    }
}

impl Logger for Analyzer {
    fn attach_problem(&mut self, problem: &MetaData) {
        if self.run.evaluations != 0 {
            self.finish_run();
        }

        let path = self.meta_path(problem);
        let data_path = bundle::relative_data_path(problem);
        let header = self.legacy_header(problem);
        let info = self.experiment_info(problem);

        let pending = self.pending.entry(path).or_insert_with(|| match self.settings.format {
            Format::Legacy => Pending::Legacy(Vec::new()),
            Format::Structured => Pending::Structured(info),
        });
        match pending {
            Pending::Legacy(blocks) => {
                if blocks.last().map(|block| block.dimension) != Some(problem.n_variables) {
                    blocks.push(LegacyBlock {
                        dimension: problem.n_variables,
                        header,
                        data_path,
                        runs: Vec::new(),
                    });
                }
            }
            Pending::Structured(info) => {
                info.scenario_mut(problem.n_variables, &data_path);
            }
        }

        self.problem = Some(problem.clone());
        self.run = RunBuffer::default();
    }

    fn log(&mut self, info: &LogInfo<'_>) {
        if self.problem.is_none() {
            return;
        }

        let row = self.row(info);
        if self.settings.triggers.iter().any(|trigger| trigger.fires(info)) {
            self.run.rows.push(row);
            self.run.unwritten = None;
        } else {
            self.run.unwritten = Some(row);
        }

        self.run.evaluations = info.evaluations;
        self.run.best_y = info.best_y;
        if info.has_improved {
            self.run.best_x = info.x.to_vec();
            self.run.best_evaluations = info.evaluations;
        }
    }

    fn record_run_attributes(&mut self, attributes: BTreeMap<String, f64>) {
        self.run.attributes = attributes;
    }

    fn reset(&mut self) {
        self.finish_run();
    }

    fn close(&mut self) -> Result<(), LoggerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.run.evaluations != 0 {
            debug!(
                evaluations = self.run.evaluations,
                "Discarding unfinished run on close"
            );
        }
        self.run = RunBuffer::default();

        if let Some(error) = self.deferred.take() {
            return Err(error);
        }

        for (path, pending) in self.pending.iter() {
            self.store(path, pending)?;
        }

        Ok(())
    }

    fn output_directory(&self) -> &Path {
        &self.settings.root
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            error!(error = ?error, root = ?self.settings.root, "Failed to close analyzer");
        }
    }
}

/// compact float formatting for data and meta data files
fn format_value(value: f64) -> String {
    if value == 0.0 || !value.is_finite() || (1e-4..1e9).contains(&value.abs()) {
        format!("{value}")
    } else {
        format!("{value:e}")
    }
}
