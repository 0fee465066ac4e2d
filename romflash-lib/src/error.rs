use std::path::PathBuf;

use thiserror::Error;

use crate::DeviceMode;

/// Convenient result type for `romflash-lib`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("profile parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("directory is empty: {}", .0.display())]
    EmptyDirectory(PathBuf),

    #[error(
        "archive {} lies inside working directory {}, which is cleared before extraction",
        archive.display(),
        working_directory.display()
    )]
    ArchiveInsideWorkingDirectory {
        archive: PathBuf,
        working_directory: PathBuf,
    },

    #[error(
        "extraction directory {} must be inside working directory {}",
        extracted.display(),
        working_directory.display()
    )]
    ExtractionOutsideWorkingDirectory {
        extracted: PathBuf,
        working_directory: PathBuf,
    },

    #[error("`{command}` failed: {stderr}")]
    ExternalToolFailure { command: String, stderr: String },

    #[error("expected device in {expected} mode, found {actual}")]
    UnexpectedDeviceMode {
        expected: DeviceMode,
        actual: DeviceMode,
    },

    #[error("expected device in bootloader or fastboot mode, found {actual}")]
    NotInFastboot { actual: DeviceMode },

    #[error("device mode is unknown, no device visible to adb or fastboot")]
    UnknownDeviceMode,

    #[error("unable to determine bootloader lock state, fastboot cannot see the device")]
    IndeterminateUnlockState,

    #[error("bootloader is locked")]
    BootloaderLocked,

    #[error("device profile error: {0}")]
    Profile(String),
}

impl Error {
    pub fn tool_failure(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::ExternalToolFailure {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    pub fn profile(msg: impl Into<String>) -> Self {
        Self::Profile(msg.into())
    }

    /// True for the path/extraction family that must stop a session before
    /// any device contact.
    pub fn is_path_error(&self) -> bool {
        matches!(
            self,
            Self::PathNotFound(_)
                | Self::EmptyDirectory(_)
                | Self::ArchiveInsideWorkingDirectory { .. }
                | Self::ExtractionOutsideWorkingDirectory { .. }
        )
    }
}
