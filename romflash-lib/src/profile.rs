//! Per-device flashing data.
//!
//! A profile is plain data: which images to write after the update package
//! and which tool arguments each step uses. Devices differ only here.

use std::path::Path;

use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::command::{Tool, shell_quote};
use crate::package::FlashTarget;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionImage {
    /// File name relative to the extracted directory.
    pub image: String,
    /// Partition to write; defaults to the image's file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl PartitionImage {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            partition: None,
        }
    }
}

/// Tool arguments for each step. `{archive}`, `{partition}` and `{image}`
/// are substituted with shell-quoted values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    /// adb arguments used while the device runs Android.
    pub reboot_bootloader_from_system: String,
    /// fastboot arguments used while the device is in fastbootd.
    pub reboot_bootloader_from_fastboot: String,
    pub wipe: String,
    pub update: String,
    pub flash: String,
    pub reboot_system: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            reboot_bootloader_from_system: "reboot bootloader".to_string(),
            reboot_bootloader_from_fastboot: "reboot bootloader".to_string(),
            wipe: "-w".to_string(),
            update: "update {archive}".to_string(),
            flash: "flash {partition} {image}".to_string(),
            reboot_system: "reboot".to_string(),
        }
    }
}

impl CommandTemplates {
    pub fn reboot_bootloader_from_system(&self) -> String {
        Tool::Adb.command(&self.reboot_bootloader_from_system)
    }

    pub fn reboot_bootloader_from_fastboot(&self) -> String {
        Tool::Fastboot.command(&self.reboot_bootloader_from_fastboot)
    }

    pub fn wipe(&self) -> String {
        Tool::Fastboot.command(&self.wipe)
    }

    pub fn update(&self, archive: &Path) -> String {
        let args = self
            .update
            .replace("{archive}", &shell_quote(&archive.to_string_lossy()));
        Tool::Fastboot.command(&args)
    }

    pub fn flash(&self, target: &FlashTarget) -> String {
        let args = self
            .flash
            .replace("{partition}", &shell_quote(&target.partition))
            .replace("{image}", &target.quoted_image());
        Tool::Fastboot.command(&args)
    }

    pub fn reboot_system(&self) -> String {
        Tool::Fastboot.command(&self.reboot_system)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    /// Written in order after the update package.
    pub images: Vec<PartitionImage>,
    #[serde(default)]
    pub commands: CommandTemplates,
}

/// Images written after `fastboot update` on dynamic-partition devices.
const DYNAMIC_PARTITION_IMAGES: &[&str] = &["product.img", "system.img", "vendor.img"];

pub static BUILTIN_PROFILES: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    "generic" => DYNAMIC_PARTITION_IMAGES,
    "moto-g8" => DYNAMIC_PARTITION_IMAGES,
};

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::from_images("generic", DYNAMIC_PARTITION_IMAGES)
    }
}

impl DeviceProfile {
    pub fn from_images(name: impl Into<String>, images: &[&str]) -> Self {
        Self {
            name: name.into(),
            images: images.iter().map(|i| PartitionImage::new(*i)).collect(),
            commands: CommandTemplates::default(),
        }
    }

    pub fn builtin(name: &str) -> Result<Self> {
        BUILTIN_PROFILES
            .get(name)
            .map(|images| Self::from_images(name, images))
            .ok_or_else(|| {
                Error::profile(format!(
                    "unknown profile '{}', available: {}",
                    name,
                    Self::builtin_names().join(", ")
                ))
            })
    }

    pub fn builtin_names() -> Vec<&'static str> {
        let mut names: Vec<_> = BUILTIN_PROFILES.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let profile: Self = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.images.iter().any(|i| i.image.trim().is_empty()) {
            return Err(Error::profile(format!(
                "profile '{}' has an empty image name",
                self.name
            )));
        }
        if !self.commands.flash.contains("{image}") {
            return Err(Error::profile("flash template must contain {image}"));
        }
        if !self.commands.update.contains("{archive}") {
            return Err(Error::profile("update template must contain {archive}"));
        }
        Ok(())
    }

    /// Resolve this profile's images against `source_dir`, in order.
    pub fn targets(&self, source_dir: &Path) -> Vec<FlashTarget> {
        self.images
            .iter()
            .map(|i| FlashTarget::new(&i.image, i.partition.as_deref(), source_dir))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_flashes_product_system_vendor_in_order() {
        let targets = DeviceProfile::builtin("generic")
            .unwrap()
            .targets(Path::new("/roms/device/rom"));
        let partitions: Vec<_> = targets.iter().map(|t| t.partition.as_str()).collect();
        assert_eq!(partitions, ["product", "system", "vendor"]);
    }

    #[test]
    fn unknown_builtin_lists_alternatives() {
        let err = DeviceProfile::builtin("nokia-3310").unwrap_err().to_string();
        assert!(err.contains("generic"));
        assert!(err.contains("moto-g8"));
    }

    #[test]
    fn templates_render_full_commands() {
        let commands = CommandTemplates::default();
        let target = FlashTarget::new("system.img", None, Path::new("/r"));
        assert_eq!(commands.flash(&target), "fastboot flash system /r/system.img");
        assert_eq!(
            commands.update(Path::new("/roms/my rom.zip")),
            "fastboot update '/roms/my rom.zip'"
        );
        assert_eq!(commands.reboot_bootloader_from_system(), "adb reboot bootloader");
        assert_eq!(commands.wipe(), "fastboot -w");
    }

    #[test]
    fn json_profile_fills_default_commands() {
        let profile = DeviceProfile::from_json(
            r#"{"name": "pixel", "images": [{"image": "vendor_boot.img"}, {"image": "x.img", "partition": "super"}]}"#,
        )
        .unwrap();
        assert_eq!(profile.commands, CommandTemplates::default());
        assert_eq!(profile.images[1].partition.as_deref(), Some("super"));
    }

    #[test]
    fn json_profile_rejects_flash_template_without_image() {
        let err = DeviceProfile::from_json(
            r#"{"name": "bad", "images": [], "commands": {"flash": "flash {partition}"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Profile(_)));
    }
}
