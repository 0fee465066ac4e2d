//! Working directory preparation and archive extraction.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path};

use zip::ZipArchive;

use crate::{Error, Result};

pub struct WorkingDirectoryManager;

impl WorkingDirectoryManager {
    /// Remove `path` if present, then create it empty.
    pub fn clear_and_create(path: &Path) -> Result<()> {
        if path.is_dir() {
            tracing::debug!("{} already found, removing.", path.display());
            fs::remove_dir_all(path)?;
        }

        tracing::debug!("Creating {}", path.display());
        fs::create_dir_all(path)?;
        Ok(())
    }

    /// Extract a zip archive into `destination`, returning the number of
    /// entries written.
    pub fn extract(archive_path: &Path, destination: &Path) -> Result<usize> {
        tracing::info!(
            "Extracting {} to {}",
            archive_path.display(),
            destination.display()
        );

        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file)?;
        fs::create_dir_all(destination)?;

        let total = archive.len();
        for i in 0..total {
            let mut entry = archive.by_index(i)?;
            let outpath = match entry.enclosed_name() {
                Some(path) => destination.join(path),
                None => {
                    tracing::warn!("Skipping unsafe archive entry {}", entry.name());
                    continue;
                }
            };

            if entry.is_dir() {
                fs::create_dir_all(&outpath)?;
            } else {
                tracing::debug!("Extracting file {}", outpath.display());
                if let Some(parent) = outpath.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut outfile = File::create(&outpath)?;
                io::copy(&mut entry, &mut outfile)?;
            }
        }

        Ok(total)
    }

    /// Log the presence of every path and return true if all exist.
    pub fn verify_exists(paths: &[&Path]) -> bool {
        let mut all_exist = true;
        for path in paths {
            if path.exists() {
                tracing::info!("{} found.", path.display());
            } else {
                tracing::warn!("{} was not found.", path.display());
                all_exist = false;
            }
        }
        all_exist
    }

    /// Like [`verify_exists`](Self::verify_exists) but reports the first
    /// missing path as an error.
    pub fn require_exists(paths: &[&Path]) -> Result<()> {
        if Self::verify_exists(paths) {
            return Ok(());
        }
        let missing = paths
            .iter()
            .find(|p| !p.exists())
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        Err(Error::PathNotFound(missing))
    }

    /// Clearing `working_directory` must not reach the archive, and the
    /// extraction must land below it so that stale content is cleared too.
    ///
    /// `archive` and `working_directory` must exist.
    pub fn require_safe_layout(
        archive: &Path,
        working_directory: &Path,
        extracted: &Path,
    ) -> Result<()> {
        if archive
            .canonicalize()?
            .starts_with(working_directory.canonicalize()?)
        {
            tracing::error!(
                "{} would be deleted when clearing {}",
                archive.display(),
                working_directory.display()
            );
            return Err(Error::ArchiveInsideWorkingDirectory {
                archive: archive.to_path_buf(),
                working_directory: working_directory.to_path_buf(),
            });
        }

        let contained = extracted
            .strip_prefix(working_directory)
            .is_ok_and(|rest| {
                rest.components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
            });
        if !contained {
            return Err(Error::ExtractionOutsideWorkingDirectory {
                extracted: extracted.to_path_buf(),
                working_directory: working_directory.to_path_buf(),
            });
        }
        Ok(())
    }

    /// `path` must be an existing directory with at least one entry.
    pub fn require_non_empty_dir(path: &Path) -> Result<()> {
        Self::require_exists(&[path])?;
        if fs::read_dir(path)?.next().is_none() {
            tracing::error!("{} is empty.", path.display());
            return Err(Error::EmptyDirectory(path.to_path_buf()));
        }
        Ok(())
    }
}
