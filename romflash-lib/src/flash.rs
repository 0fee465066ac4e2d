//! Full ROM flashing sequence.
//!
//! The session moves forward only: extract, reboot to bootloader, optional
//! wipe, update package, verify fastbootd, final images, optional reboot.
//! Nothing is undone on failure. The operator is asked before continuing
//! past an unexpected device mode.

use std::path::PathBuf;
use std::time::Duration;

use strum::Display;

use crate::command::CommandRunner;
use crate::device::Device;
use crate::mode::UnlockState;
use crate::package::{FirmwarePackage, FlashTarget};
use crate::profile::DeviceProfile;
use crate::progress::{
    ProgressCallbackArc, ProgressHelper, ProgressOperation, ProgressStatus,
    no_op_progress_callback,
};
use crate::prompt::Confirm;
use crate::workdir::WorkingDirectoryManager;
use crate::{DeviceMode, Error, Result};

pub const CONTINUE_PROMPT: &str = "Something fatal has likely occurred. Would you like to continue?";
pub const REBOOT_PROMPT: &str = "Reboot to system?";

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    NotStarted,
    Extracted,
    RebootedToBootloader,
    Wiped,
    UpdateFlashed,
    VerifiedFastboot,
    ImagesFlashed,
    RebootedToSystem,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct FlashOptions {
    /// Ask the operator at risk points instead of taking defaults.
    pub interactive: bool,
    /// Erase user data before the update.
    pub wipe: bool,
    /// Offer the final reboot to system.
    pub reboot: bool,
    /// Check for bootloader mode immediately before wiping.
    pub verify_before_wipe: bool,
    /// Refuse to flash unless fastboot reports the bootloader unlocked.
    pub require_unlocked: bool,
    /// Poll after reboots until the expected mode appears, up to this long.
    pub settle_timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            interactive: true,
            wipe: true,
            reboot: true,
            verify_before_wipe: false,
            require_unlocked: false,
            settle_timeout: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFailure {
    pub partition: String,
    pub image_path: PathBuf,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// A non-image step whose command failed but which was not fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub state: FlashState,
    pub command: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub final_state: FlashState,
    pub per_image_failures: Vec<ImageFailure>,
    pub step_failures: Vec<StepFailure>,
}

impl SessionOutcome {
    pub fn is_clean(&self) -> bool {
        self.per_image_failures.is_empty() && self.step_failures.is_empty()
    }
}

pub struct FlashOrchestrator<R, C> {
    device: Device<R>,
    prompt: C,
    package: FirmwarePackage,
    profile: DeviceProfile,
    progress: ProgressHelper,
    state: FlashState,
    history: Vec<FlashState>,
    step_failures: Vec<StepFailure>,
}

impl<R: CommandRunner, C: Confirm> FlashOrchestrator<R, C> {
    pub fn new(package: FirmwarePackage, profile: DeviceProfile, runner: R, prompt: C) -> Self {
        let device = Device::new(runner, profile.commands.clone());
        Self {
            device,
            prompt,
            package,
            profile,
            progress: ProgressHelper::new(no_op_progress_callback(), 1),
            state: FlashState::NotStarted,
            history: vec![FlashState::NotStarted],
            step_failures: Vec::new(),
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallbackArc) -> Self {
        self.progress = ProgressHelper::new(callback, 1);
        self
    }

    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Every state entered so far, starting with `NotStarted`.
    pub fn history(&self) -> &[FlashState] {
        &self.history
    }

    pub fn package(&self) -> &FirmwarePackage {
        &self.package
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn detect_mode(&self) -> DeviceMode {
        self.device.detect_mode()
    }

    pub fn is_unlocked(&self) -> UnlockState {
        self.device.is_unlocked()
    }

    /// Flash the whole package with default options otherwise.
    pub fn flash_full(&mut self, interactive: bool, wipe: bool) -> Result<SessionOutcome> {
        self.flash_full_with(&FlashOptions {
            interactive,
            wipe,
            ..FlashOptions::default()
        })
    }

    pub fn flash_full_with(&mut self, options: &FlashOptions) -> Result<SessionOutcome> {
        let span = tracing::info_span!(
            "session",
            archive = %self.package.archive_path.display(),
            profile = %self.profile.name
        );
        let _enter = span.enter();

        tracing::info!(?options, "Starting full flash");
        match self.run_session(options) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!("Flashing aborted in state {}: {}", self.state, e);
                self.transition(FlashState::Aborted);
                Err(e)
            }
        }
    }

    fn run_session(&mut self, options: &FlashOptions) -> Result<SessionOutcome> {
        self.prepare()?;
        self.reboot_to_bootloader(options)?;

        if options.require_unlocked {
            self.require_unlocked()?;
        }

        if options.wipe {
            if options.verify_before_wipe {
                self.checkpoint(DeviceMode::Bootloader, options)?;
            } else {
                tracing::debug!("Wiping without re-checking device mode");
            }
            self.wipe()?;
        }

        self.flash_update()?;
        self.checkpoint(DeviceMode::Fastboot, options)?;
        self.transition(FlashState::VerifiedFastboot);

        let per_image_failures = self.flash_images();
        self.transition(FlashState::ImagesFlashed);
        tracing::info!(
            "Flashing complete! Make sure to check the output or log for potential errors."
        );

        if options.reboot
            && self
                .prompt
                .confirm(REBOOT_PROMPT, true, !options.interactive)
        {
            self.reboot_to_system();
        } else {
            tracing::info!("Leaving device in fastboot.");
        }

        Ok(SessionOutcome {
            final_state: self.state,
            per_image_failures,
            step_failures: self.step_failures.clone(),
        })
    }

    fn transition(&mut self, next: FlashState) {
        if next == FlashState::Aborted {
            tracing::error!("{} -> {}", self.state, next);
        } else {
            tracing::info!("{} -> {}", self.state, next);
        }
        self.state = next;
        self.history.push(next);
    }

    /// Run a step command; a failure is recorded and logged, not raised.
    fn run_step(&mut self, command: String) -> bool {
        let result = self.device.run(&command);
        if !result.succeeded {
            tracing::error!("Step command '{}' failed: {}", command, result.stderr.trim_end());
            self.step_failures.push(StepFailure {
                state: self.state,
                command,
                stderr: result.stderr,
            });
        }
        result.succeeded
    }

    fn prepare(&mut self) -> Result<()> {
        let pkg = &self.package;
        let bar = self.progress.create_spinner(ProgressOperation::Extract {
            archive: pkg.archive_path.display().to_string(),
        });

        let prepared = WorkingDirectoryManager::require_exists(&[
            pkg.archive_path.as_path(),
            pkg.working_directory.as_path(),
        ])
        .and_then(|_| {
            WorkingDirectoryManager::require_safe_layout(
                &pkg.archive_path,
                &pkg.working_directory,
                &pkg.extracted_directory,
            )
        })
        .and_then(|_| WorkingDirectoryManager::clear_and_create(&pkg.working_directory))
        .and_then(|_| WorkingDirectoryManager::extract(&pkg.archive_path, &pkg.extracted_directory))
        .and_then(|count| {
            tracing::info!("Extracted {} entries", count);
            WorkingDirectoryManager::require_non_empty_dir(&pkg.extracted_directory)
        });

        match prepared {
            Ok(()) => {
                bar.finish(ProgressStatus::Success);
                self.transition(FlashState::Extracted);
                Ok(())
            }
            Err(e) => {
                bar.finish(ProgressStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    fn reboot_to_bootloader(&mut self, options: &FlashOptions) -> Result<()> {
        tracing::info!("Rebooting to bootloader...");
        let bar = self.progress.create_spinner(ProgressOperation::RebootToBootloader);

        let mode = self.device.detect_mode();
        tracing::info!("Device detected in {} mode", mode);
        let command = match self.device.reboot_to_bootloader_command(mode) {
            Ok(command) => command,
            Err(e) => {
                tracing::error!("Device mode {} unknown, unable to proceed.", mode);
                bar.finish(ProgressStatus::Failed(e.to_string()));
                return Err(e);
            }
        };

        match command {
            None => {
                tracing::debug!("Already in bootloader");
                bar.finish(ProgressStatus::Skipped);
            }
            Some(command) => {
                let ok = self.run_step(command);
                bar.finish(if ok {
                    ProgressStatus::Success
                } else {
                    ProgressStatus::Failed("reboot command failed".into())
                });
                if let Some(timeout) = options.settle_timeout {
                    self.settle(DeviceMode::Bootloader, timeout, options.poll_interval);
                }
            }
        }

        self.transition(FlashState::RebootedToBootloader);
        Ok(())
    }

    fn settle(&self, expected: DeviceMode, timeout: Duration, poll: Duration) -> DeviceMode {
        let bar = self
            .progress
            .create_spinner(ProgressOperation::WaitForMode { expected });
        let mode = self.device.wait_for_mode(expected, timeout, poll);
        if mode == expected {
            bar.finish(ProgressStatus::Success);
        } else {
            tracing::warn!("Device did not reach {} within {:?}, found {}", expected, timeout, mode);
            bar.finish(ProgressStatus::Failed(format!("found {}", mode)));
        }
        mode
    }

    fn require_unlocked(&mut self) -> Result<()> {
        match self.device.is_unlocked() {
            UnlockState::Unlocked => {
                tracing::info!("Bootloader is unlocked.");
                Ok(())
            }
            UnlockState::Locked => {
                tracing::error!("Bootloader is locked, refusing to flash.");
                Err(Error::BootloaderLocked)
            }
            UnlockState::Unknown => Err(Error::IndeterminateUnlockState),
        }
    }

    /// Compare the live mode with `expected`. On mismatch the operator may
    /// override; otherwise the session aborts.
    fn checkpoint(&mut self, expected: DeviceMode, options: &FlashOptions) -> Result<DeviceMode> {
        let actual = match options.settle_timeout {
            Some(timeout) => self.settle(expected, timeout, options.poll_interval),
            None => {
                let bar = self.progress.create_spinner(ProgressOperation::DetectMode);
                let mode = self.device.detect_mode();
                bar.finish(ProgressStatus::Success);
                mode
            }
        };

        if actual == expected {
            tracing::info!("Device is in {} mode as expected.", expected);
            return Ok(actual);
        }

        tracing::error!("Device is not in {}, mode={}.", expected, actual);
        if self
            .prompt
            .confirm(CONTINUE_PROMPT, false, !options.interactive)
        {
            tracing::warn!("Operator chose to continue with device in {} mode.", actual);
            Ok(actual)
        } else {
            Err(Error::UnexpectedDeviceMode { expected, actual })
        }
    }

    fn wipe(&mut self) -> Result<()> {
        tracing::info!("Formatting device...");
        let bar = self.progress.create_spinner(ProgressOperation::Wipe);
        let ok = self.run_step(self.device.commands().wipe());
        bar.finish(if ok {
            ProgressStatus::Success
        } else {
            ProgressStatus::Failed("wipe command failed".into())
        });
        self.transition(FlashState::Wiped);
        Ok(())
    }

    fn flash_update(&mut self) -> Result<()> {
        tracing::info!("Flashing rom update and then rebooting to fastboot to finish...");
        let bar = self.progress.create_spinner(ProgressOperation::FlashUpdate);
        let command = self.device.commands().update(&self.package.archive_path);
        let ok = self.run_step(command);
        bar.finish(if ok {
            ProgressStatus::Success
        } else {
            ProgressStatus::Failed("update command failed".into())
        });
        tracing::debug!("Flashing rom update complete.");
        self.transition(FlashState::UpdateFlashed);
        Ok(())
    }

    /// Write every profile image. A failure is recorded and the loop moves
    /// on to the next image.
    fn flash_images(&mut self) -> Vec<ImageFailure> {
        tracing::info!("Flashing final rom images...");
        let targets: Vec<FlashTarget> = self.profile.targets(&self.package.extracted_directory);
        let bar = self.progress.create_bar(
            targets.len() as u64,
            ProgressOperation::FlashImages {
                count: targets.len(),
            },
        );

        let mut failures = Vec::new();
        for target in &targets {
            bar.set_message(
                ProgressOperation::FlashImage {
                    partition: target.partition.clone(),
                }
                .to_string(),
            );
            let command = self.device.commands().flash(target);
            let result = self.device.run(&command);
            if result.succeeded {
                tracing::info!("Flashed {}", target.partition);
            } else {
                tracing::error!(
                    "Flashing {} from {} failed: {}",
                    target.partition,
                    target.image_path.display(),
                    result.stderr.trim_end()
                );
                failures.push(ImageFailure {
                    partition: target.partition.clone(),
                    image_path: target.image_path.clone(),
                    stderr: result.stderr,
                    exit_code: result.exit_code,
                });
            }
            bar.inc(1);
        }

        if failures.is_empty() {
            bar.finish(ProgressStatus::Success);
        } else {
            let names: Vec<_> = failures.iter().map(|f| f.partition.as_str()).collect();
            tracing::error!("{} image(s) failed to flash: {}", failures.len(), names.join(", "));
            bar.finish(ProgressStatus::Failed(names.join(", ")));
        }
        failures
    }

    fn reboot_to_system(&mut self) {
        tracing::info!("Rebooting to system...");
        let bar = self.progress.create_spinner(ProgressOperation::RebootToSystem);
        let ok = self.run_step(self.device.commands().reboot_system());
        if ok {
            bar.finish(ProgressStatus::Success);
            self.transition(FlashState::RebootedToSystem);
        } else {
            bar.finish(ProgressStatus::Failed("reboot command failed".into()));
        }
    }
}
