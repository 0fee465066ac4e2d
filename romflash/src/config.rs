use anyhow::{Context, Result, bail};
use romflash_lib::DeviceProfile;
use serde::{Deserialize, Serialize};

/// Default configuration values
pub struct Defaults;

impl Defaults {
    pub const PROFILE: &'static str = "generic";
    pub const WIPE: bool = true;
    pub const INTERACTIVE: bool = true;
    pub const REBOOT: bool = true;
    pub const SETTLE_TIMEOUT_SECS: u64 = 30;
    pub const POLL_INTERVAL_MS: u64 = 1000;
}

/// Root of the JSON configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RomflashConfig {
    pub archive: Option<String>,
    pub working_directory: Option<String>,
    pub extracted_directory: Option<String>,
    #[serde(default = "default_profile")]
    pub profile: String,
    pub profile_file: Option<String>,
    #[serde(default = "default_wipe")]
    pub wipe: bool,
    #[serde(default = "default_interactive")]
    pub interactive: bool,
    #[serde(default = "default_reboot")]
    pub reboot: bool,
    #[serde(default)]
    pub verify_before_wipe: bool,
    #[serde(default)]
    pub require_unlocked: bool,
    #[serde(default = "default_settle_timeout_secs")]
    pub settle_timeout_secs: u64,
}

fn default_profile() -> String {
    Defaults::PROFILE.to_string()
}
fn default_wipe() -> bool {
    Defaults::WIPE
}
fn default_interactive() -> bool {
    Defaults::INTERACTIVE
}
fn default_reboot() -> bool {
    Defaults::REBOOT
}
fn default_settle_timeout_secs() -> u64 {
    Defaults::SETTLE_TIMEOUT_SECS
}

impl RomflashConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        let config: RomflashConfig =
            serde_json::from_str(&content).with_context(|| "Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_defaults() -> Self {
        Self {
            archive: None,
            working_directory: None,
            extracted_directory: None,
            profile: Defaults::PROFILE.to_string(),
            profile_file: None,
            wipe: Defaults::WIPE,
            interactive: Defaults::INTERACTIVE,
            reboot: Defaults::REBOOT,
            verify_before_wipe: false,
            require_unlocked: false,
            settle_timeout_secs: Defaults::SETTLE_TIMEOUT_SECS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.profile_file.is_none() {
            DeviceProfile::builtin(&self.profile)?;
        }
        if let Some(archive) = &self.archive
            && archive.trim().is_empty()
        {
            bail!("archive must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_object_takes_defaults() {
        let config: RomflashConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.profile, "generic");
        assert!(config.wipe && config.interactive && config.reboot);
        assert_eq!(config.settle_timeout_secs, 30);
        config.validate().unwrap();
    }

    #[test]
    fn from_file_rejects_unknown_profile() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"profile": "does-not-exist"}}"#).unwrap();
        assert!(RomflashConfig::from_file(file.path().to_str().unwrap()).is_err());
    }
}
