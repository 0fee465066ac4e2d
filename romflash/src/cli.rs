use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use romflash_lib::{DeviceMode, DeviceProfile, FirmwarePackage, FlashOptions};

use crate::config::{Defaults, RomflashConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "romflash CLI", long_about = None)]
pub struct Cli {
    /// JSON configuration file path
    #[arg(long = "config", short = 'f', global = true)]
    pub config: Option<String>,

    /// Suppress progress output
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Flash a full ROM archive
    #[command(name = "flash")]
    Flash(FlashArgs),

    /// Print the device's current boot mode
    #[command(name = "mode")]
    Mode,

    /// Print the bootloader lock state
    #[command(name = "unlocked")]
    Unlocked,

    /// Wait until the device reaches a boot mode
    #[command(name = "wait")]
    Wait(WaitArgs),

    /// Flash a single partition image
    #[command(name = "flash-image")]
    FlashImage(FlashImageArgs),

    /// Flash an update package without extracting it
    #[command(name = "update")]
    Update(UpdateArgs),

    /// Erase user data
    #[command(name = "wipe")]
    Wipe(WipeArgs),

    /// List built-in device profiles
    #[command(name = "profiles")]
    Profiles,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProfileArgs {
    /// Built-in device profile (default: generic)
    #[arg(long = "profile")]
    pub profile: Option<String>,

    /// Device profile JSON file, overrides --profile
    #[arg(long = "profile-file")]
    pub profile_file: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FlashArgs {
    /// ROM zip archive
    pub archive: Option<String>,

    /// Working directory (default: archive path without extension)
    #[arg(long = "working-dir")]
    pub working_dir: Option<String>,

    /// Extraction directory (default: <working-dir>/rom)
    #[arg(long = "extract-dir")]
    pub extract_dir: Option<String>,

    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Keep user data
    #[arg(long = "no-wipe")]
    pub no_wipe: bool,

    /// Never prompt; take the default answer at every question
    #[arg(short = 'y', long = "non-interactive")]
    pub non_interactive: bool,

    /// Leave the device in fastboot when done
    #[arg(long = "no-reboot")]
    pub no_reboot: bool,

    /// Check for bootloader mode right before wiping
    #[arg(long = "verify-before-wipe")]
    pub verify_before_wipe: bool,

    /// Refuse to flash a locked or unreadable bootloader
    #[arg(long = "require-unlocked")]
    pub require_unlocked: bool,

    /// Seconds to wait for the device after reboots, 0 to check once (default: 30)
    #[arg(long = "settle-timeout")]
    pub settle_timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct WaitArgs {
    /// Boot mode to wait for
    #[arg(value_enum)]
    pub mode: DeviceMode,

    /// Seconds before giving up
    #[arg(long = "timeout", default_value_t = 60)]
    pub timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct FlashImageArgs {
    /// Image file
    pub image: String,

    /// Partition name (default: image file stem)
    #[arg(long = "partition")]
    pub partition: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Update package archive
    pub archive: String,

    #[command(flatten)]
    pub profile: ProfileArgs,
}

#[derive(Args, Debug, Clone)]
pub struct WipeArgs {
    /// Do not ask for confirmation
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

/// Everything a flash session needs after CLI and config file are merged.
#[derive(Debug, Clone)]
pub struct FlashSettings {
    pub package: FirmwarePackage,
    pub profile: DeviceProfile,
    pub options: FlashOptions,
}

pub fn resolve_profile(args: &ProfileArgs, config: &RomflashConfig) -> Result<DeviceProfile> {
    if let Some(path) = args.profile_file.as_ref().or(config.profile_file.as_ref()) {
        return DeviceProfile::from_json_file(Path::new(path))
            .with_context(|| format!("Failed to load device profile '{}'", path));
    }
    let name = args
        .profile
        .clone()
        .unwrap_or_else(|| config.profile.clone());
    Ok(DeviceProfile::builtin(&name)?)
}

/// Merge CLI arguments with configuration file, CLI args take precedence
pub fn merge_config(args: &FlashArgs, config: Option<RomflashConfig>) -> Result<FlashSettings> {
    let base = config.unwrap_or_else(RomflashConfig::with_defaults);

    let archive = args
        .archive
        .clone()
        .or_else(|| base.archive.clone())
        .context("Archive must be specified either as an argument or in config file")?;
    let working_dir = args
        .working_dir
        .clone()
        .or_else(|| base.working_directory.clone())
        .map(PathBuf::from);
    let extract_dir = args
        .extract_dir
        .clone()
        .or_else(|| base.extracted_directory.clone())
        .map(PathBuf::from);
    let package = FirmwarePackage::with_overrides(archive, working_dir, extract_dir);

    let profile = resolve_profile(&args.profile, &base)?;

    let settle_secs = args.settle_timeout.unwrap_or(base.settle_timeout_secs);
    let options = FlashOptions {
        interactive: !args.non_interactive && base.interactive,
        wipe: !args.no_wipe && base.wipe,
        reboot: !args.no_reboot && base.reboot,
        verify_before_wipe: args.verify_before_wipe || base.verify_before_wipe,
        require_unlocked: args.require_unlocked || base.require_unlocked,
        settle_timeout: (settle_secs > 0).then(|| Duration::from_secs(settle_secs)),
        poll_interval: Duration::from_millis(Defaults::POLL_INTERVAL_MS),
    };

    Ok(FlashSettings {
        package,
        profile,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> FlashArgs {
        let cli = Cli::parse_from(std::iter::once("romflash").chain(args.iter().copied()));
        match cli.command {
            Commands::Flash(flash) => flash,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn defaults_without_config() {
        let settings = merge_config(&parse(&["flash", "/roms/device.zip"]), None).unwrap();
        assert_eq!(settings.package.extracted_directory, PathBuf::from("/roms/device/rom"));
        assert_eq!(settings.profile.name, "generic");
        assert!(settings.options.interactive);
        assert!(settings.options.wipe);
        assert_eq!(settings.options.settle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn cli_flags_override_config() {
        let config: RomflashConfig = serde_json::from_str(
            r#"{"archive": "/cfg/rom.zip", "profile": "moto-g8", "settle_timeout_secs": 5}"#,
        )
        .unwrap();
        let settings = merge_config(
            &parse(&["flash", "/cli/rom.zip", "--no-wipe", "-y", "--settle-timeout", "0"]),
            Some(config),
        )
        .unwrap();
        assert_eq!(settings.package.archive_path, PathBuf::from("/cli/rom.zip"));
        assert_eq!(settings.profile.name, "moto-g8");
        assert!(!settings.options.wipe);
        assert!(!settings.options.interactive);
        assert_eq!(settings.options.settle_timeout, None);
    }

    #[test]
    fn archive_from_config_when_not_given() {
        let config: RomflashConfig =
            serde_json::from_str(r#"{"archive": "/cfg/rom.zip", "wipe": false}"#).unwrap();
        let settings = merge_config(&parse(&["flash"]), Some(config)).unwrap();
        assert_eq!(settings.package.working_directory, PathBuf::from("/cfg/rom"));
        assert!(!settings.options.wipe);
    }

    #[test]
    fn missing_archive_is_an_error() {
        assert!(merge_config(&parse(&["flash"]), None).is_err());
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let args = parse(&["flash", "/r.zip", "--profile", "nope"]);
        assert!(merge_config(&args, None).is_err());
    }
}
