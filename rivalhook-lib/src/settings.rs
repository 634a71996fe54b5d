use std::{
    env,
    fs::read_to_string,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::{
    address_table::{AddressTable, StateAddresses},
    hook::{HookSite, JumpStub},
    lane::MAX_CAPACITY,
};

/// Longest action wait that still leaves room for the frame itself.
pub const MAX_ACTION_WAIT_MS: u64 = 9;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HookSettings {
    pub tick: usize,
    pub prologue_len: usize,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            tick: 0x1_4123_4560,
            prologue_len: 14,
        }
    }
}

impl Default for StateAddresses {
    fn default() -> Self {
        Self {
            entity_health: 0x143A_BCD0,
            entity_position: 0x143A_C4E0,
            entity_cooldowns: 0x143A_D120,
            objective_progress: 0x143A_F8B4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputSettings {
    pub action: usize,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            action: 0x142B_6F10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSettings {
    /// Directory holding the lane files; empty means the OS temp directory.
    pub dir: PathBuf,
    pub state_lane: String,
    pub action_lane: String,
    pub capacity: usize,
    pub action_wait_ms: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            state_lane: "state".to_owned(),
            action_lane: "action".to_owned(),
            capacity: 8,
            action_wait_ms: 1,
        }
    }
}

impl ChannelSettings {
    pub fn lane_dir(&self) -> PathBuf {
        if self.dir.as_os_str().is_empty() {
            env::temp_dir()
        } else {
            self.dir.clone()
        }
    }

    pub fn lane_path(&self, tag: &str) -> PathBuf {
        self.lane_dir().join(format!("{}.lane", tag))
    }

    pub fn action_wait(&self) -> Duration {
        Duration::from_millis(self.action_wait_ms)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=MAX_CAPACITY).contains(&self.capacity) {
            return Err(SettingsError::Invalid(format!(
                "channel.capacity must be between 1 and {}, got {}",
                MAX_CAPACITY, self.capacity
            )));
        }
        if self.action_wait_ms > MAX_ACTION_WAIT_MS {
            return Err(SettingsError::Invalid(format!(
                "channel.action_wait_ms must be at most {}, got {}",
                MAX_ACTION_WAIT_MS, self.action_wait_ms
            )));
        }
        for (name, tag) in [
            ("state_lane", &self.state_lane),
            ("action_lane", &self.action_lane),
        ] {
            if tag.is_empty() || tag.contains(['/', '\\']) {
                return Err(SettingsError::Invalid(format!(
                    "channel.{} must be a plain non-empty name, got {:?}",
                    name, tag
                )));
            }
        }
        if self.state_lane == self.action_lane {
            return Err(SettingsError::Invalid(format!(
                "state and action lanes share the tag {:?}",
                self.state_lane
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticsSettings {
    /// Ticks between statistics lines; 0 disables them.
    pub stats_interval: u64,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            stats_interval: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// When set, every address is an offset from this module's base.
    pub module: Option<String>,
    pub hook: HookSettings,
    pub state: StateAddresses,
    pub input: InputSettings,
    pub channel: ChannelSettings,
    pub diagnostics: DiagnosticsSettings,
}

impl Settings {
    pub fn parse(toml: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(toml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let toml = read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&toml)
    }

    /// Like [`Self::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        match Self::load(path) {
            Err(SettingsError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                warn!("{:?} not found, using built-in addresses", path);
                Ok(Self::default())
            }
            result => result,
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let required = JumpStub::native().len();
        if self.hook.prologue_len < required {
            return Err(SettingsError::Invalid(format!(
                "hook.prologue_len must be at least {}, got {}",
                required, self.hook.prologue_len
            )));
        }
        self.channel.validate()
    }

    /// Absolute addresses, given the base of [`Self::module`] (ignored when no
    /// module is set).
    pub fn address_table(&self, module_base: usize) -> AddressTable {
        let base = if self.module.is_some() { module_base } else { 0 };
        AddressTable {
            tick: HookSite::new(base + self.hook.tick, self.hook.prologue_len),
            state: self.state.offset_by(base),
            input_action: base + self.input.action,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings, Settings::default());
        let table = settings.address_table(0xdead_0000);
        assert_eq!(table.tick.target, 0x1_4123_4560);
        assert_eq!(table.state.objective_progress, 0x143A_F8B4);
        assert_eq!(table.input_action, 0x142B_6F10);
    }

    #[test]
    fn parses_hex_and_partial_sections() {
        let settings = Settings::parse(
            r#"
module = "Host.exe"

[hook]
tick = 0x1000
prologue_len = 16

[state]
entity_health = 0x2000

[channel]
dir = "lanes"
capacity = 4
action_wait_ms = 3
"#,
        )
        .unwrap();
        assert_eq!(settings.module.as_deref(), Some("Host.exe"));
        assert_eq!(settings.state.entity_position, 0x143A_C4E0);
        assert_eq!(settings.channel.state_lane, "state");
        assert_eq!(settings.channel.action_wait(), Duration::from_millis(3));
        assert_eq!(
            settings.channel.lane_path("state"),
            Path::new("lanes").join("state.lane")
        );

        let table = settings.address_table(0x4000_0000);
        assert_eq!(table.tick, HookSite::new(0x4000_1000, 16));
        assert_eq!(table.state.entity_health, 0x4000_2000);
        assert_eq!(table.input_action, 0x4000_0000 + 0x142B_6F10);
    }

    #[test]
    fn largest_capacity_is_accepted() {
        let settings = Settings::parse("[channel]\ncapacity = 4096").unwrap();
        assert_eq!(settings.channel.capacity, MAX_CAPACITY);
    }

    #[test]
    fn empty_dir_uses_temp_dir() {
        let channel = ChannelSettings::default();
        assert_eq!(channel.lane_dir(), env::temp_dir());
    }

    #[test]
    fn rejects_invalid_values() {
        for toml in [
            "[channel]\ncapacity = 0",
            "[channel]\ncapacity = 4097",
            "[channel]\ncapacity = 9223372036854775807",
            "[channel]\naction_wait_ms = 10",
            "[channel]\nstate_lane = \"\"",
            "[channel]\naction_lane = \"state\"",
            "[channel]\nstate_lane = \"../x\"",
            "[hook]\nprologue_len = 5",
        ] {
            assert!(
                matches!(Settings::parse(toml), Err(SettingsError::Invalid(_))),
                "{}",
                toml
            );
        }
    }

    #[test]
    fn rejects_malformed_toml_and_unknown_keys() {
        assert!(matches!(
            Settings::parse("[hook\ntick = 1"),
            Err(SettingsError::Parse(_))
        ));
        assert!(matches!(
            Settings::parse("[hook]\ntarget = 1"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_but_unreadable_content_does_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rivalhook.toml");
        assert_eq!(
            Settings::load_or_default(&path).unwrap(),
            Settings::default()
        );
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::Read { .. })
        ));

        fs::write(&path, "[channel]\ncapacity = \"eight\"").unwrap();
        assert!(matches!(
            Settings::load_or_default(&path),
            Err(SettingsError::Parse(_))
        ));
    }
}
