//! External tool invocation.
//!
//! Every interaction with the device goes through a [`CommandRunner`]. The
//! runner never fails: a command that cannot be spawned or exits non-zero is
//! reported through [`CommandResult::succeeded`] so the caller decides
//! whether to continue.

use std::path::PathBuf;
use std::process::{Command, Output};

use strum::{Display, EnumString};

/// The two external tools this crate drives.
#[derive(EnumString, Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Userspace bridge, reachable while Android is running.
    #[strum(serialize = "adb")]
    Adb,
    /// Bootloader tool, reachable in bootloader and fastbootd.
    #[strum(serialize = "fastboot")]
    Fastboot,
}

impl Tool {
    /// Prefix `args` with this tool's executable name.
    pub fn command(self, args: &str) -> String {
        format!("{} {}", self, args)
    }
}

/// Captured result of one external invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub succeeded: bool,
    /// Exit code, `None` when killed by a signal or never spawned.
    pub exit_code: Option<i32>,
}

impl CommandResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            succeeded: true,
            exit_code: Some(0),
        }
    }

    pub fn failure(stderr: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            succeeded: false,
            exit_code,
        }
    }

    /// fastboot prints `getvar` answers on stderr, so markers are looked up
    /// in both streams.
    pub fn contains(&self, marker: &str) -> bool {
        self.stdout.contains(marker) || self.stderr.contains(marker)
    }
}

impl From<Output> for CommandResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            succeeded: output.status.success(),
            exit_code: output.status.code(),
        }
    }
}

pub trait CommandRunner {
    /// Execute a full shell command line.
    fn run(&self, command: &str) -> CommandResult;

    fn adb(&self, args: &str) -> CommandResult {
        self.run(&Tool::Adb.command(args))
    }

    fn fastboot(&self, args: &str) -> CommandResult {
        self.run(&Tool::Fastboot.command(args))
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command: &str) -> CommandResult {
        (**self).run(command)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Box<R> {
    fn run(&self, command: &str) -> CommandResult {
        (**self).run(command)
    }
}

/// Runs commands through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    working_directory: Option<PathBuf>,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every invocation to `dir`.
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: Some(dir.into()),
        }
    }

    fn shell(command: &str) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str) -> CommandResult {
        tracing::debug!(command, "running");

        let mut cmd = Self::shell(command);
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }

        let result = match cmd.output() {
            Ok(output) => CommandResult::from(output),
            Err(e) => CommandResult::failure(format!("failed to spawn shell: {}", e), None),
        };

        if result.succeeded {
            tracing::debug!(stdout = %result.stdout.trim_end(), stderr = %result.stderr.trim_end(), "command finished");
        } else {
            tracing::error!("Command '{}' failed with exit code {:?}", command, result.exit_code);
            tracing::error!("Error output: {}", result.stderr.trim_end());
        }
        result
    }
}

/// Quote `arg` for a POSIX shell when it contains anything outside a
/// conservative safe set.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:=@,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
