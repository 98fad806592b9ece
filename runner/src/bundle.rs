//! On-disk layout of an output bundle.
//!
//! ```text
//! <root>/<folder_name>/IOHprofiler_f<id>_<name>.{info,json}
//! <root>/<folder_name>/data_f<id>_<name>/IOHprofiler_f<id>_DIM<dimension>.dat
//! ```
//!
//! Temporary bundles written by parallel workers live next to the target folder as
//! `<root>/<folder_name>-tmp-<index>`.

pub mod meta;

use crate::problem::MetaData;
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
};

pub const META_PREFIX: &str = "IOHprofiler";
pub const DATA_DIR_PREFIX: &str = "data";
pub const DATA_EXTENSION: &str = "dat";
pub const TEMP_INFIX: &str = "-tmp";

/// the two incompatible meta data formats
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// line based `.info` files, merged by appending
    #[default]
    Legacy,
    /// `.json` documents holding a list of scenarios, merged per dimension
    Structured,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Legacy => "info",
            Self::Structured => "json",
        }
    }

    /// resolve the format of a meta data file, `None` for any other file
    pub fn of(path: &Path) -> Option<Self> {
        let file_name = path.file_name().and_then(OsStr::to_str)?;
        if !file_name.starts_with(META_PREFIX) {
            return None;
        }

        match path.extension().and_then(OsStr::to_str)? {
            "info" => Some(Self::Legacy),
            "json" => Some(Self::Structured),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy (.info)"),
            Self::Structured => f.write_str("structured (.json)"),
        }
    }
}

/// `IOHprofiler_f<id>_<name>`, shared by the meta file of both formats
pub fn meta_stem(problem: &MetaData) -> String {
    format!("{META_PREFIX}_f{}_{}", problem.problem_id, problem.name)
}

pub fn meta_file_name(problem: &MetaData, format: Format) -> String {
    format!("{}.{}", meta_stem(problem), format.extension())
}

pub fn data_dir_name(problem: &MetaData) -> String {
    format!("{DATA_DIR_PREFIX}_f{}_{}", problem.problem_id, problem.name)
}

pub fn data_file_name(problem: &MetaData) -> String {
    format!(
        "{META_PREFIX}_f{}_DIM{}.{DATA_EXTENSION}",
        problem.problem_id, problem.n_variables
    )
}

/// data file path relative to the bundle root, as referenced from the meta data
pub fn relative_data_path(problem: &MetaData) -> String {
    format!("{}/{}", data_dir_name(problem), data_file_name(problem))
}

/// the raw data directory that belongs to a meta data file
pub fn data_dir_of(meta_file: &Path) -> Option<PathBuf> {
    let stem = meta_file.file_stem().and_then(OsStr::to_str)?;
    let suffix = stem.strip_prefix(META_PREFIX)?;

    Some(meta_file.with_file_name(format!("{DATA_DIR_PREFIX}{suffix}")))
}

/// path of the bundle exclusively owned by the job with the given index
pub fn temp_bundle(root: &Path, folder_name: &str, index: usize) -> PathBuf {
    root.join(format!("{folder_name}{TEMP_INFIX}-{index}"))
}

/// index of a temporary bundle of `folder_name`, if `name` is one
pub fn temp_index(name: &str, folder_name: &str) -> Option<usize> {
    name.strip_prefix(folder_name)?
        .strip_prefix(TEMP_INFIX)?
        .strip_prefix('-')?
        .parse()
        .ok()
}
