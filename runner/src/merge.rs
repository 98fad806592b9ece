#[cfg(test)]
mod merge_test;

use crate::bundle::{
    self,
    meta::{MetaError, MetaFile},
    Format,
};
use std::{
    collections::{btree_map::Entry, BTreeMap},
    ffi::OsStr,
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to access {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Meta data of {stem} exists as {existing} in {first:?} and as {incoming} in {second:?}")]
    IncompatibleFormats {
        stem: String,
        existing: Format,
        incoming: Format,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("Failed to merge meta data file {path:?}")]
    Meta {
        path: PathBuf,
        #[source]
        source: MetaError,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> MergeError + '_ {
    move |source| MergeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn meta_error(path: &Path) -> impl FnOnce(MetaError) -> MergeError + '_ {
    move |source| MergeError::Meta {
        path: path.to_path_buf(),
        source,
    }
}

/// Consolidates the bundles below `directory` that belong to `folder_name`.
///
/// Discovery is purely name based: every directory called `<folder_name>-tmp-<index>` is a
/// temporary bundle, every `<folder_name>-<number>` an earlier result. Unrelated experiments
/// sharing a directory must therefore use folder names that are not prefixes of each other.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    directory: PathBuf,
    folder_name: String,
}

impl MergeEngine {
    pub fn new(directory: &Path, folder_name: &str) -> Self {
        Self {
            directory: directory.to_path_buf(),
            folder_name: folder_name.to_string(),
        }
    }

    /// the canonical bundle `<directory>/<folder_name>`
    pub fn target(&self) -> PathBuf {
        self.directory.join(&self.folder_name)
    }

    /// first name out of `<folder_name>`, `<folder_name>-1`, ... that is not taken yet
    pub fn free_target(&self) -> PathBuf {
        let mut target = self.target();
        let mut index = 1;

        while target.exists() {
            target = self.directory.join(format!("{}-{index}", self.folder_name));
            index += 1;
        }

        target
    }

    /// sub directories of `directory` whose name is accepted by `index_of`, sorted by index
    fn bundles_by(
        &self,
        index_of: impl Fn(&str) -> Option<usize>,
    ) -> Result<Vec<PathBuf>, MergeError> {
        if !self.directory.is_dir() {
            return Ok(Vec::new());
        }

        let mut bundles = BTreeMap::new();
        for entry in fs::read_dir(&self.directory).map_err(io_error(&self.directory))? {
            let path = entry.map_err(io_error(&self.directory))?.path();
            if !path.is_dir() {
                continue;
            }

            if let Some(index) = path.file_name().and_then(OsStr::to_str).and_then(&index_of) {
                bundles.insert(index, path);
            }
        }

        Ok(bundles.into_values().collect())
    }

    /// the temporary bundles left by parallel jobs, ordered by job index
    pub fn temp_bundles(&self) -> Result<Vec<PathBuf>, MergeError> {
        self.bundles_by(|name| bundle::temp_index(name, &self.folder_name))
    }

    /// earlier results stored next to the target as `<folder_name>-<number>`
    pub fn numbered_bundles(&self) -> Result<Vec<PathBuf>, MergeError> {
        self.bundles_by(|name| {
            name.strip_prefix(&self.folder_name)?
                .strip_prefix('-')?
                .parse()
                .ok()
        })
    }

    /// Merge all temporary bundles and, with `consolidate`, every numbered sibling into the
    /// target. Returns the resulting bundle, or `None` if there was nothing to merge.
    ///
    /// Format conflicts and unreadable meta data are detected before anything is moved, so a
    /// failed merge leaves every bundle untouched.
    #[instrument(skip(self), fields(directory = ?self.directory, folder = %self.folder_name), level = "info")]
    pub fn merge(&self, consolidate: bool) -> Result<Option<PathBuf>, MergeError> {
        let temporary = self.temp_bundles()?;

        let mut involved = temporary.clone();
        if consolidate {
            involved.extend(self.numbered_bundles()?);
            involved.push(self.target());
        }
        check_formats(&involved)?;

        let mut result = None;
        if let Some((seed, others)) = temporary.split_first() {
            let target = self.free_target();
            info!(seed = ?seed, target = ?target, "Merging {} temporary bundles", temporary.len());

            fs::rename(seed, &target).map_err(io_error(seed))?;
            for source in others {
                merge_bundle(source, &target)?;
            }
            result = Some(target);
        } else {
            debug!("No temporary bundles to merge");
        }

        if consolidate {
            let target = self.target();
            for source in self.numbered_bundles()? {
                if target.exists() {
                    merge_bundle(&source, &target)?;
                } else {
                    debug!(source = ?source, "Promoting bundle to {target:?}");
                    fs::rename(&source, &target).map_err(io_error(&source))?;
                }
            }

            if target.is_dir() {
                result = Some(target);
            }
        }

        Ok(result)
    }
}

/// Fail if the same problem is stored with different meta data formats anywhere in `bundles`,
/// or if any meta data file cannot be read back.
pub fn check_formats(bundles: &[PathBuf]) -> Result<(), MergeError> {
    let mut seen: BTreeMap<String, (Format, PathBuf)> = BTreeMap::new();

    for directory in bundles.iter().filter(|directory| directory.is_dir()) {
        for entry in fs::read_dir(directory).map_err(io_error(directory))? {
            let path = entry.map_err(io_error(directory))?.path();
            let (Some(format), Some(stem)) = (
                Format::of(&path),
                path.file_stem().and_then(OsStr::to_str),
            ) else {
                continue;
            };
            MetaFile::load(&path).map_err(meta_error(&path))?;

            match seen.entry(stem.to_string()) {
                Entry::Occupied(entry) => {
                    let (existing, first) = entry.get();
                    if *existing != format {
                        return Err(MergeError::IncompatibleFormats {
                            stem: stem.to_string(),
                            existing: *existing,
                            incoming: format,
                            first: first.clone(),
                            second: path.clone(),
                        });
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert((format, path.clone()));
                }
            }
        }
    }

    Ok(())
}

/// Move the contents of `source` into `target`, combining meta data and appending raw data
/// files, then remove `source`.
pub fn merge_bundle(source: &Path, target: &Path) -> Result<(), MergeError> {
    debug!(source = ?source, target = ?target, "Merging bundle");
    fs::create_dir_all(target).map_err(io_error(target))?;

    for entry in fs::read_dir(source).map_err(io_error(source))? {
        let path = entry.map_err(io_error(source))?.path();
        if !path.is_file() || Format::of(&path).is_none() {
            continue;
        }

        let Some(file_name) = path.file_name() else {
            continue;
        };
        let target_meta = target.join(file_name);
        merge_meta(&path, &target_meta)?;

        if let (Some(source_data), Some(target_data)) =
            (bundle::data_dir_of(&path), bundle::data_dir_of(&target_meta))
        {
            if source_data.is_dir() {
                append_data(&source_data, &target_data)?;
            }
        }
    }

    if let Err(error) = fs::remove_dir(source) {
        warn!(source = ?source, error = %error, "Bundle is not empty after merging, leaving it in place");
    }

    Ok(())
}

fn merge_meta(source: &Path, target: &Path) -> Result<(), MergeError> {
    if !target.exists() {
        return fs::rename(source, target).map_err(io_error(source));
    }

    let mut existing = MetaFile::load(target).map_err(meta_error(target))?;
    let incoming = MetaFile::load(source).map_err(meta_error(source))?;
    existing.absorb(incoming).map_err(meta_error(target))?;
    existing.store(target).map_err(meta_error(target))?;

    fs::remove_file(source).map_err(io_error(source))
}

/// append every raw data file of `source` to its namesake in `target`
fn append_data(source: &Path, target: &Path) -> Result<(), MergeError> {
    fs::create_dir_all(target).map_err(io_error(target))?;

    for entry in fs::read_dir(source).map_err(io_error(source))? {
        let path = entry.map_err(io_error(source))?.path();
        let Some(file_name) = path.file_name().filter(|_| path.is_file()) else {
            continue;
        };
        let target_file = target.join(file_name);

        let mut input = fs::File::open(&path).map_err(io_error(&path))?;
        let mut output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target_file)
            .map_err(io_error(&target_file))?;
        io::copy(&mut input, &mut output).map_err(io_error(&target_file))?;

        fs::remove_file(&path).map_err(io_error(&path))?;
    }

    if let Err(error) = fs::remove_dir(source) {
        warn!(source = ?source, error = %error, "Data directory is not empty after merging");
    }

    Ok(())
}
