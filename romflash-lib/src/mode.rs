//! Boot mode detection.
//!
//! All knowledge of adb/fastboot output wording lives in this module as
//! named markers. Nothing here is cached: every query re-invokes the tools.

use std::time::{Duration, Instant};

use crate::command::{CommandResult, CommandRunner};
use crate::{DeviceMode, Error, Result};

/// State token adb and fastboot print next to a usable device.
pub const DEVICE_MARKER: &str = "device";
/// State token fastboot prints for a device sitting in the bootloader.
pub const FASTBOOT_LISTING_MARKER: &str = "fastboot";
/// Header line adb prints before the listing, which itself contains "device".
pub const ADB_LIST_HEADER: &str = "List of devices attached";
pub const UNLOCKED_MARKER: &str = "securestate: flashing_unlocked";
pub const USERSPACE_MARKER: &str = "is-userspace: yes";

pub const ADB_DEVICES: &str = "devices";
pub const FASTBOOT_DEVICES: &str = "devices";
pub const GETVAR_IS_USERSPACE: &str = "getvar is-userspace";
pub const GETVAR_SECURESTATE: &str = "getvar securestate";

/// Bootloader lock status. `Unknown` is never to be read as locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnlockState {
    #[strum(serialize = "unlocked")]
    Unlocked,
    #[strum(serialize = "locked")]
    Locked,
    #[strum(serialize = "unknown")]
    Unknown,
}

impl UnlockState {
    pub fn as_option(self) -> Option<bool> {
        match self {
            Self::Unlocked => Some(true),
            Self::Locked => Some(false),
            Self::Unknown => None,
        }
    }

    /// Collapse to a boolean, failing on `Unknown`.
    pub fn require_known(self) -> Result<bool> {
        self.as_option().ok_or(Error::IndeterminateUnlockState)
    }
}

/// Lines of a device listing, minus the adb header and blank lines.
fn listing_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(ADB_LIST_HEADER))
}

/// The state column of a `<serial> <state> ...` listing line.
fn listing_state(line: &str) -> Option<&str> {
    line.split_whitespace().nth(1)
}

/// True when an `adb devices` response lists a device in the `device` state.
///
/// Only stdout of a successful call counts; shell errors such as
/// `fastboot: not found` land on stderr.
pub fn adb_lists_device(result: &CommandResult) -> bool {
    result.succeeded
        && listing_lines(&result.stdout).any(|line| listing_state(line) == Some(DEVICE_MARKER))
}

/// True when a `fastboot devices` response lists any device.
pub fn fastboot_lists_device(result: &CommandResult) -> bool {
    result.succeeded
        && listing_lines(&result.stdout).any(|line| {
            matches!(
                listing_state(line),
                Some(DEVICE_MARKER | FASTBOOT_LISTING_MARKER)
            )
        })
}

pub fn is_userspace(result: &CommandResult) -> bool {
    result.contains(USERSPACE_MARKER)
}

pub fn is_flashing_unlocked(result: &CommandResult) -> bool {
    result.contains(UNLOCKED_MARKER)
}

pub struct ModeDetector<R> {
    runner: R,
}

impl<R: CommandRunner> ModeDetector<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn is_adb_available(&self) -> bool {
        let available = adb_lists_device(&self.runner.adb(ADB_DEVICES));
        tracing::debug!(available, "adb status");
        available
    }

    pub fn is_fastboot_available(&self) -> bool {
        let available = fastboot_lists_device(&self.runner.fastboot(FASTBOOT_DEVICES));
        tracing::debug!(available, "fastboot status");
        available
    }

    /// Classify the current boot mode.
    ///
    /// adb is consulted first and wins over fastboot.
    pub fn detect_mode(&self) -> DeviceMode {
        let mode = if self.is_adb_available() {
            DeviceMode::System
        } else if !self.is_fastboot_available() {
            tracing::warn!("Device is in unknown boot mode.");
            DeviceMode::Unknown
        } else if is_userspace(&self.runner.fastboot(GETVAR_IS_USERSPACE)) {
            DeviceMode::Fastboot
        } else {
            DeviceMode::Bootloader
        };
        tracing::debug!(%mode, "detected boot mode");
        mode
    }

    pub fn is_unlocked(&self) -> UnlockState {
        if !self.is_fastboot_available() {
            tracing::error!("Fastboot not available to check device bootloader status.");
            return UnlockState::Unknown;
        }

        if is_flashing_unlocked(&self.runner.fastboot(GETVAR_SECURESTATE)) {
            UnlockState::Unlocked
        } else {
            UnlockState::Locked
        }
    }

    /// Poll [`detect_mode`](Self::detect_mode) until `expected` shows up or
    /// `timeout` elapses. Returns the last mode observed.
    pub fn wait_for_mode(&self, expected: DeviceMode, timeout: Duration, poll: Duration) -> DeviceMode {
        let deadline = Instant::now() + timeout;
        loop {
            let mode = self.detect_mode();
            if mode == expected || Instant::now() >= deadline {
                return mode;
            }
            tracing::debug!(%mode, %expected, "waiting for device to settle");
            std::thread::sleep(poll);
        }
    }
}
