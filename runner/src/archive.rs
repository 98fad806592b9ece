use ignore::WalkBuilder;
use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument};
use zip::{result::ZipError, write::FileOptions, CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Bundle {0:?} does not exist")]
    MissingBundle(PathBuf),
    #[error("Failed to access {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to walk the bundle")]
    Walk(#[from] ignore::Error),
    #[error("Failed to write the archive")]
    Zip(#[from] ZipError),
}

/// Compresses a bundle into `<bundle>.zip` next to it.
#[derive(Debug, Clone)]
pub struct Archiver {
    bundle: PathBuf,
}

impl Archiver {
    pub fn new(bundle: &Path) -> Self {
        Self {
            bundle: bundle.to_path_buf(),
        }
    }

    /// location of the archive, a sibling of the bundle
    pub fn archive_path(&self) -> PathBuf {
        let mut name = self
            .bundle
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".zip");

        self.bundle.with_file_name(name)
    }

    /// Write the archive and, with `remove_data`, delete the bundle once the archive is
    /// complete. Entries are stored relative to the bundle root.
    #[instrument(skip(self), fields(bundle = ?self.bundle), level = "info")]
    pub fn archive(&self, remove_data: bool) -> Result<PathBuf, ArchiveError> {
        if !self.bundle.is_dir() {
            return Err(ArchiveError::MissingBundle(self.bundle.clone()));
        }

        let archive = self.archive_path();
        let file = File::create(&archive).map_err(|source| ArchiveError::Io {
            path: archive.clone(),
            source,
        })?;
        let mut writer = ZipWriter::new(BufWriter::new(file));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut walker = WalkBuilder::new(&self.bundle);
        walker.standard_filters(false).sort_by_file_name(|a, b| a.cmp(b));

        for entry in walker.build() {
            let entry = entry?;
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&self.bundle) else {
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }

            // zip entries always use forward slashes
            let name = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if path.is_dir() {
                writer.add_directory(name, options)?;
            } else {
                debug!("Adding {name} to archive");
                writer.start_file(name, options)?;
                let mut input = File::open(path).map_err(|source| ArchiveError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                io::copy(&mut input, &mut writer).map_err(|source| ArchiveError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }
        // the data may only go once the archive is on disk
        let io_error = |source: io::Error| ArchiveError::Io {
            path: archive.clone(),
            source,
        };
        let file = writer
            .finish()?
            .into_inner()
            .map_err(|error| io_error(error.into_error()))?;
        file.sync_all().map_err(io_error)?;
        info!(archive = ?archive, "Archived bundle");

        if remove_data {
            fs::remove_dir_all(&self.bundle).map_err(|source| ArchiveError::Io {
                path: self.bundle.clone(),
                source,
            })?;
            info!("Removed uncompressed bundle");
        }

        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn bundle(root: &Path) -> PathBuf {
        let bundle = root.join("out");
        fs::create_dir_all(bundle.join("data_f1_Sphere")).unwrap();
        fs::write(bundle.join("IOHprofiler_f1_Sphere.info"), "meta\n").unwrap();
        fs::write(bundle.join("data_f1_Sphere/IOHprofiler_f1_DIM5.dat"), "rows\n").unwrap();
        bundle
    }

    #[test]
    fn archives_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = bundle(dir.path());

        let archive = Archiver::new(&bundle).archive(false).unwrap();
        assert_eq!(archive, dir.path().join("out.zip"));
        assert!(bundle.is_dir());

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut content = String::new();
        zip.by_name("data_f1_Sphere/IOHprofiler_f1_DIM5.dat")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "rows\n");
        assert!(zip.by_name("IOHprofiler_f1_Sphere.info").is_ok());
    }

    #[test]
    fn removes_data_after_archiving() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = bundle(dir.path());

        let archive = Archiver::new(&bundle).archive(true).unwrap();

        assert!(archive.is_file());
        assert!(!bundle.exists());
    }

    #[test]
    fn unwritable_archive_keeps_the_data() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = bundle(dir.path());
        fs::create_dir(dir.path().join("out.zip")).unwrap();

        assert!(matches!(
            Archiver::new(&bundle).archive(true),
            Err(ArchiveError::Io { .. })
        ));
        assert!(bundle.join("data_f1_Sphere/IOHprofiler_f1_DIM5.dat").is_file());
    }

    #[test]
    fn missing_bundle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            Archiver::new(&dir.path().join("out")).archive(true),
            Err(ArchiveError::MissingBundle(_))
        ));
        assert!(!dir.path().join("out.zip").exists());
    }
}
