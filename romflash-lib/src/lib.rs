pub mod command;
pub mod device;
pub mod error;
pub mod flash;
pub mod mode;
pub mod package;
pub mod profile;
pub mod progress;
pub mod prompt;
pub mod workdir;

pub use command::{CommandResult, CommandRunner, ShellRunner, Tool};
pub use device::Device;
pub use error::{Error, Result};
pub use flash::{FlashOptions, FlashOrchestrator, FlashState, ImageFailure, SessionOutcome, StepFailure};
pub use mode::{ModeDetector, UnlockState};
pub use package::{FirmwarePackage, FlashTarget};
pub use profile::{CommandTemplates, DeviceProfile, PartitionImage};
pub use prompt::{Confirm, ScriptedPrompt, TerminalPrompt};

use strum::{Display, EnumString};

/// Where the device currently is, as seen through adb and fastboot.
#[derive(EnumString, Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum DeviceMode {
    /// Neither tool can see a device.
    #[strum(serialize = "unknown")]
    Unknown,
    /// Android is running and adb is authorized.
    #[strum(serialize = "system")]
    System,
    /// The bootloader's own fastboot implementation.
    #[strum(serialize = "bootloader")]
    Bootloader,
    /// Userspace fastboot (fastbootd) in recovery.
    #[strum(serialize = "fastboot")]
    Fastboot,
}
