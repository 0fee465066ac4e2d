//! Device-level operations built on adb and fastboot.

use std::path::Path;
use std::time::Duration;

use crate::command::{CommandResult, CommandRunner};
use crate::mode::{ModeDetector, UnlockState};
use crate::package::FlashTarget;
use crate::profile::CommandTemplates;
use crate::{DeviceMode, Error, Result};

pub struct Device<R> {
    runner: R,
    commands: CommandTemplates,
}

impl<R: CommandRunner> Device<R> {
    pub fn new(runner: R, commands: CommandTemplates) -> Self {
        Self { runner, commands }
    }

    pub fn commands(&self) -> &CommandTemplates {
        &self.commands
    }

    pub fn detector(&self) -> ModeDetector<&R> {
        ModeDetector::new(&self.runner)
    }

    pub fn detect_mode(&self) -> DeviceMode {
        self.detector().detect_mode()
    }

    pub fn is_unlocked(&self) -> UnlockState {
        self.detector().is_unlocked()
    }

    pub fn wait_for_mode(&self, expected: DeviceMode, timeout: Duration, poll: Duration) -> DeviceMode {
        self.detector().wait_for_mode(expected, timeout, poll)
    }

    pub fn run(&self, command: &str) -> CommandResult {
        tracing::debug!(command, "issuing");
        self.runner.run(command)
    }

    /// Run `command`, turning a failed invocation into an error.
    pub fn run_checked(&self, command: &str) -> Result<CommandResult> {
        let result = self.run(command);
        if result.succeeded {
            Ok(result)
        } else {
            Err(Error::tool_failure(command, result.stderr.trim_end()))
        }
    }

    /// The reboot command appropriate for leaving `from`, or `None` when
    /// already in the bootloader.
    pub fn reboot_to_bootloader_command(&self, from: DeviceMode) -> Result<Option<String>> {
        match from {
            DeviceMode::Bootloader => Ok(None),
            DeviceMode::System => Ok(Some(self.commands.reboot_bootloader_from_system())),
            DeviceMode::Fastboot => Ok(Some(self.commands.reboot_bootloader_from_fastboot())),
            DeviceMode::Unknown => Err(Error::UnknownDeviceMode),
        }
    }

    /// Fails unless fastboot can address the device.
    fn require_fastboot_mode(&self) -> Result<DeviceMode> {
        let mode = self.detect_mode();
        match mode {
            DeviceMode::Bootloader | DeviceMode::Fastboot => Ok(mode),
            actual => Err(Error::NotInFastboot { actual }),
        }
    }

    /// Erase user data.
    pub fn wipe_data(&self) -> Result<()> {
        self.require_fastboot_mode()?;
        tracing::info!("Formatting device...");
        self.run_checked(&self.commands.wipe())?;
        Ok(())
    }

    /// Flash an update package archive as-is.
    pub fn flash_update_package(&self, archive: &Path) -> Result<()> {
        if !archive.exists() {
            return Err(Error::PathNotFound(archive.to_path_buf()));
        }
        self.require_fastboot_mode()?;
        tracing::info!("Flashing update package {}...", archive.display());
        self.run_checked(&self.commands.update(archive))?;
        Ok(())
    }

    /// Write a single partition image.
    pub fn flash_image(&self, target: &FlashTarget) -> Result<()> {
        if !target.image_path.exists() {
            return Err(Error::PathNotFound(target.image_path.clone()));
        }
        tracing::info!(
            "Flashing {} to {}",
            target.image_path.display(),
            target.partition
        );
        self.run_checked(&self.commands.flash(target))?;
        Ok(())
    }

    pub fn reboot_to_system(&self) -> Result<()> {
        self.run_checked(&self.commands.reboot_system())?;
        Ok(())
    }
}
