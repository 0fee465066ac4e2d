use std::path::{Path, PathBuf};

use crate::command::shell_quote;

/// Name of the directory the archive is extracted into, below the working
/// directory.
pub const EXTRACTED_DIR_NAME: &str = "rom";

/// Paths belonging to one flashing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwarePackage {
    pub archive_path: PathBuf,
    pub working_directory: PathBuf,
    pub extracted_directory: PathBuf,
}

impl FirmwarePackage {
    /// `/roms/device.zip` gives working directory `/roms/device` and
    /// extracted directory `/roms/device/rom`.
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self::with_overrides(archive_path, None, None)
    }

    /// All three paths are made absolute against the current directory,
    /// since commands may run from a different one.
    pub fn with_overrides(
        archive_path: impl Into<PathBuf>,
        working_directory: Option<PathBuf>,
        extracted_directory: Option<PathBuf>,
    ) -> Self {
        let archive_path = absolute(archive_path.into());
        let working_directory = working_directory
            .map(absolute)
            .unwrap_or_else(|| archive_path.with_extension(""));
        let extracted_directory = extracted_directory
            .map(absolute)
            .unwrap_or_else(|| working_directory.join(EXTRACTED_DIR_NAME));
        Self {
            archive_path,
            working_directory,
            extracted_directory,
        }
    }

    /// Resolve `image` against the extracted directory.
    pub fn target(&self, image: &str, partition: Option<&str>) -> FlashTarget {
        FlashTarget::new(image, partition, &self.extracted_directory)
    }
}

/// One partition write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashTarget {
    pub partition: String,
    pub image_path: PathBuf,
}

impl FlashTarget {
    /// When `partition` is `None` it is the image's file stem, so
    /// `system.img` flashes `system`.
    pub fn new(image: impl AsRef<Path>, partition: Option<&str>, source_dir: &Path) -> Self {
        let image = image.as_ref();
        let partition = match partition {
            Some(p) => p.to_string(),
            None => partition_from_image(image),
        };
        Self {
            partition,
            image_path: source_dir.join(image),
        }
    }

    pub fn quoted_image(&self) -> String {
        shell_quote(&self.image_path.to_string_lossy())
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

pub fn partition_from_image(image: &Path) -> String {
    image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
