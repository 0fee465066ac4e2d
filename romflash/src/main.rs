mod cli;
mod config;
mod progress;

use std::path::Path;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use romflash_lib::{
    Confirm, Device, DeviceProfile, FlashOrchestrator, FlashTarget, ShellRunner, TerminalPrompt,
    UnlockState,
};

use crate::cli::{Cli, Commands, FlashArgs, merge_config, resolve_profile};
use crate::config::{Defaults, RomflashConfig};

const EXIT_FAILURE: i32 = 1;
const EXIT_INDETERMINATE: i32 = 2;

fn load_config(path: Option<&str>) -> Result<Option<RomflashConfig>> {
    path.map(RomflashConfig::from_file).transpose()
}

fn shell_device(config: &RomflashConfig) -> Result<Device<ShellRunner>> {
    let profile = resolve_profile(&Default::default(), config)?;
    Ok(Device::new(ShellRunner::new(), profile.commands))
}

fn run_flash(args: &FlashArgs, config: Option<RomflashConfig>, quiet: bool) -> Result<()> {
    let settings = merge_config(args, config)?;
    let runner = ShellRunner::in_directory(&settings.package.working_directory);

    let mut flasher = FlashOrchestrator::new(settings.package, settings.profile, runner, TerminalPrompt)
        .with_progress(progress::create_progress_callback(quiet));

    let outcome = flasher.flash_full_with(&settings.options)?;

    for failure in &outcome.step_failures {
        tracing::warn!("Step in {} failed: {}", failure.state, failure.command);
    }
    for failure in &outcome.per_image_failures {
        tracing::error!(
            "Partition {} was not flashed from {}",
            failure.partition,
            failure.image_path.display()
        );
    }
    println!("Finished in state {}", outcome.final_state);

    if !outcome.per_image_failures.is_empty() {
        bail!(
            "{} partition image(s) failed to flash",
            outcome.per_image_failures.len()
        );
    }
    Ok(())
}

fn run(args: Cli) -> Result<i32> {
    let config = load_config(args.config.as_deref())?;

    match &args.command {
        Commands::Flash(flash) => {
            run_flash(flash, config, args.quiet)?;
        }
        Commands::Mode => {
            let device = shell_device(&config.unwrap_or_else(RomflashConfig::with_defaults))?;
            println!("{}", device.detect_mode());
        }
        Commands::Unlocked => {
            let device = shell_device(&config.unwrap_or_else(RomflashConfig::with_defaults))?;
            let state = device.is_unlocked();
            println!("{}", state);
            if state == UnlockState::Unknown {
                return Ok(EXIT_INDETERMINATE);
            }
        }
        Commands::Wait(wait) => {
            let device = shell_device(&config.unwrap_or_else(RomflashConfig::with_defaults))?;
            let mode = device.wait_for_mode(
                wait.mode,
                Duration::from_secs(wait.timeout),
                Duration::from_millis(Defaults::POLL_INTERVAL_MS),
            );
            println!("{}", mode);
            if mode != wait.mode {
                bail!("Device did not reach {} within {}s", wait.mode, wait.timeout);
            }
        }
        Commands::FlashImage(image) => {
            let device = shell_device(&config.unwrap_or_else(RomflashConfig::with_defaults))?;
            let path = Path::new(&image.image);
            let dir = path.parent().unwrap_or_else(|| Path::new(""));
            let file = path.file_name().context("Image path has no file name")?;
            let target = FlashTarget::new(file, image.partition.as_deref(), dir);
            device
                .flash_image(&target)
                .with_context(|| format!("Failed to flash {}", image.image))?;
        }
        Commands::Update(update) => {
            let config = config.unwrap_or_else(RomflashConfig::with_defaults);
            let profile = resolve_profile(&update.profile, &config)?;
            let device = Device::new(ShellRunner::new(), profile.commands);
            device
                .flash_update_package(Path::new(&update.archive))
                .with_context(|| format!("Failed to flash update package {}", update.archive))?;
        }
        Commands::Wipe(wipe) => {
            let device = shell_device(&config.unwrap_or_else(RomflashConfig::with_defaults))?;
            if !wipe.yes
                && !TerminalPrompt.confirm("This erases all user data. Continue?", false, false)
            {
                bail!("Wipe declined");
            }
            device.wipe_data().context("Failed to wipe device")?;
        }
        Commands::Profiles => {
            for name in DeviceProfile::builtin_names() {
                let profile = DeviceProfile::builtin(name)?;
                let images: Vec<_> = profile.images.iter().map(|i| i.image.as_str()).collect();
                println!("{}: {}", name, images.join(", "));
            }
        }
    }
    Ok(0)
}

fn main() {
    // Log level can be controlled by setting the RUST_LOG environment variable, e.g.:
    // RUST_LOG=debug, RUST_LOG=romflash_lib=trace, RUST_LOG=warn
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    let args = Cli::parse();

    match run(args) {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_FAILURE);
        }
    }
}
