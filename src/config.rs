use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::PlayerId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KitItem {
    pub id: String,
    pub count: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KitDefinition {
    pub display_name: String,
    pub cooldown_seconds: u64,
    /// Replace the inventory instead of adding to it.
    pub replace: bool,
    pub items: Vec<KitItem>,
}

impl Default for KitDefinition {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            cooldown_seconds: 0,
            replace: false,
            items: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupFormat {
    pub group: String,
    pub format: String,
}

/// A chat group and the players in it. Earlier groups outrank later ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupDefinition {
    pub name: String,
    pub prefix: String,
    pub suffix: String,
    pub members: Vec<PlayerId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub teleport_warmup_seconds: u64,
    pub teleport_cooldown_seconds: u64,
    pub movement_tolerance: f64,
    pub teleport_grace_millis: u64,
    pub tpa_expiry_seconds: u64,
    pub tpa_cooldown_seconds: u64,
    pub max_homes: usize,
    pub home_cooldown_seconds: u64,
    pub save_retry_attempts: u32,
    pub save_retry_backoff_millis: u64,
    pub io_timeout_seconds: u64,
    pub unload_timeout_seconds: u64,
    pub chat_fallback_format: String,
    pub chat_formats: Vec<GroupFormat>,
    pub groups: Vec<GroupDefinition>,
    pub kits: BTreeMap<String, KitDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        let mut kits = BTreeMap::new();
        kits.insert(
            "starter".to_string(),
            KitDefinition {
                display_name: "Starter".to_string(),
                cooldown_seconds: 300,
                replace: false,
                items: vec![
                    KitItem {
                        id: "minecraft:stone_sword".to_string(),
                        count: 1,
                    },
                    KitItem {
                        id: "minecraft:bread".to_string(),
                        count: 16,
                    },
                ],
            },
        );
        Self {
            teleport_warmup_seconds: 3,
            teleport_cooldown_seconds: 0,
            movement_tolerance: 0.5,
            teleport_grace_millis: 500,
            tpa_expiry_seconds: 60,
            tpa_cooldown_seconds: 0,
            max_homes: 3,
            home_cooldown_seconds: 0,
            save_retry_attempts: 3,
            save_retry_backoff_millis: 250,
            io_timeout_seconds: 10,
            unload_timeout_seconds: 5,
            chat_fallback_format: "<{PLAYER}> {MESSAGE}".to_string(),
            chat_formats: vec![GroupFormat {
                group: "admin".to_string(),
                format: "[Admin] {PLAYER}: {MESSAGE}".to_string(),
            }],
            groups: Vec::new(),
            kits,
        }
    }
}

impl Config {
    pub fn teleport_warmup(&self) -> Duration {
        Duration::from_secs(self.teleport_warmup_seconds)
    }

    pub fn teleport_cooldown(&self) -> Duration {
        Duration::from_secs(self.teleport_cooldown_seconds)
    }

    pub fn teleport_grace(&self) -> Duration {
        Duration::from_millis(self.teleport_grace_millis)
    }

    pub fn tpa_expiry(&self) -> Duration {
        Duration::from_secs(self.tpa_expiry_seconds)
    }

    pub fn tpa_cooldown(&self) -> Duration {
        Duration::from_secs(self.tpa_cooldown_seconds)
    }

    pub fn home_cooldown(&self) -> Duration {
        Duration::from_secs(self.home_cooldown_seconds)
    }

    pub fn save_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.save_retry_backoff_millis)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_seconds)
    }

    pub fn unload_timeout(&self) -> Duration {
        Duration::from_secs(self.unload_timeout_seconds)
    }
}

const CONFIG_FILE_NAME: &str = "config.yml";

fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

fn yaml_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\"', "\\\"")
        .replace('\n', "\\n")
}

fn default_config_yaml() -> String {
    let d = Config::default();
    let mut out = format!(
        "# Teleport\n\
teleport_warmup_seconds: {teleport_warmup_seconds}\n\
teleport_cooldown_seconds: {teleport_cooldown_seconds}\n\
movement_tolerance: {movement_tolerance}\n\
teleport_grace_millis: {teleport_grace_millis}\n\
\n\
# Teleport requests (/tpa, /tpahere)\n\
tpa_expiry_seconds: {tpa_expiry_seconds}\n\
tpa_cooldown_seconds: {tpa_cooldown_seconds}\n\
\n\
# Homes\n\
max_homes: {max_homes}\n\
home_cooldown_seconds: {home_cooldown_seconds}\n\
\n\
# Player data\n\
save_retry_attempts: {save_retry_attempts}\n\
save_retry_backoff_millis: {save_retry_backoff_millis}\n\
io_timeout_seconds: {io_timeout_seconds}\n\
unload_timeout_seconds: {unload_timeout_seconds}\n\
\n\
# Chat\n\
chat_fallback_format: \"{chat_fallback_format}\"\n\
chat_formats:\n",
        teleport_warmup_seconds = d.teleport_warmup_seconds,
        teleport_cooldown_seconds = d.teleport_cooldown_seconds,
        movement_tolerance = d.movement_tolerance,
        teleport_grace_millis = d.teleport_grace_millis,
        tpa_expiry_seconds = d.tpa_expiry_seconds,
        tpa_cooldown_seconds = d.tpa_cooldown_seconds,
        max_homes = d.max_homes,
        home_cooldown_seconds = d.home_cooldown_seconds,
        save_retry_attempts = d.save_retry_attempts,
        save_retry_backoff_millis = d.save_retry_backoff_millis,
        io_timeout_seconds = d.io_timeout_seconds,
        unload_timeout_seconds = d.unload_timeout_seconds,
        chat_fallback_format = yaml_escape(&d.chat_fallback_format),
    );
    for entry in &d.chat_formats {
        out.push_str(&format!(
            "  - group: \"{}\"\n    format: \"{}\"\n",
            yaml_escape(&entry.group),
            yaml_escape(&entry.format)
        ));
    }
    out.push_str(
        "\n# Chat groups, most important first. Without any, everyone uses the fallback.\n\
# groups:\n\
#   - name: \"admin\"\n\
#     prefix: \"[A] \"\n\
#     suffix: \"\"\n\
#     members: [\"<uuid>\"]\n\
groups: []\n",
    );
    out.push_str("\n# Kits\nkits:\n");
    for (id, kit) in &d.kits {
        out.push_str(&format!(
            "  {id}:\n    display_name: \"{}\"\n    cooldown_seconds: {}\n    replace: {}\n    items:\n",
            yaml_escape(&kit.display_name),
            kit.cooldown_seconds,
            kit.replace
        ));
        for item in &kit.items {
            out.push_str(&format!(
                "      - id: \"{}\"\n        count: {}\n",
                yaml_escape(&item.id),
                item.count
            ));
        }
    }
    out
}

pub fn load_or_create(data_dir: &Path) -> Result<Config, ConfigError> {
    if !data_dir.exists() {
        fs::create_dir_all(data_dir)?;
    }

    let path = config_path(data_dir);
    if !path.exists() {
        fs::write(&path, default_config_yaml())?;
    }

    let content = fs::read_to_string(path)?;
    let config = serde_yaml::from_str::<Config>(&content)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_yaml_parses_back_to_defaults() {
        let parsed: Config = serde_yaml::from_str(&default_config_yaml()).unwrap();
        let d = Config::default();
        assert_eq!(parsed.teleport_warmup_seconds, d.teleport_warmup_seconds);
        assert_eq!(parsed.tpa_expiry_seconds, d.tpa_expiry_seconds);
        assert_eq!(parsed.max_homes, d.max_homes);
        assert_eq!(parsed.chat_formats, d.chat_formats);
        assert_eq!(parsed.groups, d.groups);
        assert_eq!(parsed.kits, d.kits);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let parsed: Config = serde_yaml::from_str("tpa_expiry_seconds: 30\n").unwrap();
        assert_eq!(parsed.tpa_expiry(), Duration::from_secs(30));
        assert_eq!(parsed.teleport_warmup(), Duration::from_secs(3));
    }

    #[test]
    fn groups_parse_with_member_uuids() {
        let parsed: Config = serde_yaml::from_str(
            "groups:\n  - name: vip\n    prefix: \"* \"\n    members: [\"6f1c7a2e-5d0b-4f8e-9a3c-2b1d4e5f6a7b\"]\n",
        )
        .unwrap();
        assert_eq!(parsed.groups.len(), 1);
        assert_eq!(parsed.groups[0].prefix, "* ");
        assert_eq!(parsed.groups[0].suffix, "");
        assert_eq!(parsed.groups[0].members.len(), 1);
    }

    #[test]
    fn load_or_create_writes_the_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("jinx_essentials");
        let config = load_or_create(&data_dir).unwrap();
        assert!(config_path(&data_dir).exists());
        assert_eq!(config.unload_timeout(), Duration::from_secs(5));
    }
}
