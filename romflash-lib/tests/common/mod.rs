#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use romflash_lib::{CommandResult, CommandRunner, DeviceMode};

pub const ADB_DEVICES: &str = "adb devices";
pub const FASTBOOT_DEVICES: &str = "fastboot devices";
pub const GETVAR_USERSPACE: &str = "fastboot getvar is-userspace";
pub const GETVAR_SECURESTATE: &str = "fastboot getvar securestate";

pub fn adb_listing(present: bool) -> CommandResult {
    if present {
        CommandResult::success("List of devices attached\nZY22LQ5\tdevice\n\n")
    } else {
        CommandResult::success("List of devices attached\n\n")
    }
}

pub fn fastboot_listing(present: bool) -> CommandResult {
    if present {
        CommandResult::success("ZY22LQ5\tfastboot\n")
    } else {
        CommandResult::success("")
    }
}

/// fastboot answers getvar on stderr.
pub fn getvar(answer: &str) -> CommandResult {
    CommandResult {
        stderr: format!("{}\nFinished. Total time: 0.001s\n", answer),
        succeeded: true,
        exit_code: Some(0),
        ..Default::default()
    }
}

/// Scripted adb/fastboot. Each command has a queue of responses; the last
/// one repeats. Unscripted commands succeed with no output.
#[derive(Default)]
pub struct FakeRunner {
    responses: RefCell<HashMap<String, VecDeque<CommandResult>>>,
    calls: RefCell<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the answers for a sequence of `detect_mode` calls.
    pub fn in_modes(modes: &[DeviceMode]) -> Self {
        let runner = Self::new();
        for mode in modes {
            runner.respond(ADB_DEVICES, adb_listing(*mode == DeviceMode::System));
            match mode {
                DeviceMode::System => {}
                DeviceMode::Unknown => runner.respond(FASTBOOT_DEVICES, fastboot_listing(false)),
                DeviceMode::Bootloader => {
                    runner.respond(FASTBOOT_DEVICES, fastboot_listing(true));
                    runner.respond(GETVAR_USERSPACE, getvar("is-userspace: no"));
                }
                DeviceMode::Fastboot => {
                    runner.respond(FASTBOOT_DEVICES, fastboot_listing(true));
                    runner.respond(GETVAR_USERSPACE, getvar("is-userspace: yes"));
                }
            }
        }
        runner
    }

    pub fn respond(&self, command: &str, result: CommandResult) {
        self.responses
            .borrow_mut()
            .entry(command.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn fail(&self, command: &str, stderr: &str) {
        self.respond(command, CommandResult::failure(stderr, Some(1)));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == command).count()
    }

    pub fn called(&self, command: &str) -> bool {
        self.count(command) > 0
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &str) -> CommandResult {
        self.calls.borrow_mut().push(command.to_string());
        let mut responses = self.responses.borrow_mut();
        match responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => CommandResult::success(""),
        }
    }
}

/// Write a zip archive holding `entries` (name, contents).
pub fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// A ROM archive plus its (existing) working directory inside `root`.
pub fn rom_fixture(root: &Path) -> PathBuf {
    let archive = root.join("device.zip");
    write_archive(
        &archive,
        &[
            ("product.img", b"product"),
            ("system.img", b"system"),
            ("vendor.img", b"vendor"),
            ("META-INF/com/android/metadata", b"ota-type=AB"),
        ],
    );
    std::fs::create_dir(root.join("device")).unwrap();
    archive
}
