//! Permission-group lookups and the chat format that follows from them.
//!
//! The provider is picked once at startup: `ConfiguredGroups` when group
//! data is available, `NoGroups` otherwise.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::{Config, GroupFormat};
use crate::model::PlayerId;

pub trait GroupProvider: Send + Sync {
    /// Groups of the player, most important first.
    fn groups(&self, player: PlayerId) -> Vec<String>;

    fn primary_group(&self, player: PlayerId) -> Option<String> {
        self.groups(player).into_iter().next()
    }

    fn prefix(&self, _player: PlayerId) -> String {
        String::new()
    }

    fn suffix(&self, _player: PlayerId) -> String {
        String::new()
    }
}

pub struct NoGroups;

impl GroupProvider for NoGroups {
    fn groups(&self, _player: PlayerId) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Clone, Debug, Default)]
pub struct GroupMeta {
    pub groups: Vec<String>,
    pub prefix: String,
    pub suffix: String,
}

/// Group membership pushed in by the host (e.g. from its permission system).
#[derive(Default)]
pub struct ConfiguredGroups {
    members: RwLock<HashMap<PlayerId, GroupMeta>>,
}

impl ConfiguredGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, player: PlayerId, meta: GroupMeta) {
        self.members.write().unwrap().insert(player, meta);
    }

}

/// `ConfiguredGroups` built from the `groups` section, or `NoGroups` when
/// that section is empty.
pub fn provider_from_config(config: &Config) -> Arc<dyn GroupProvider> {
    if config.groups.is_empty() {
        return Arc::new(NoGroups);
    }
    let provider = ConfiguredGroups::new();
    let mut members: HashMap<PlayerId, GroupMeta> = HashMap::new();
    for group in &config.groups {
        for player in &group.members {
            let meta = members.entry(*player).or_insert_with(|| GroupMeta {
                prefix: group.prefix.clone(),
                suffix: group.suffix.clone(),
                ..GroupMeta::default()
            });
            meta.groups.push(group.name.clone());
        }
    }
    log::info!(
        "{} chat groups configured for {} players",
        config.groups.len(),
        members.len()
    );
    for (player, meta) in members {
        provider.assign(player, meta);
    }
    Arc::new(provider)
}

impl GroupProvider for ConfiguredGroups {
    fn groups(&self, player: PlayerId) -> Vec<String> {
        let members = self.members.read().unwrap();
        members
            .get(&player)
            .map(|meta| meta.groups.clone())
            .unwrap_or_default()
    }

    fn prefix(&self, player: PlayerId) -> String {
        let members = self.members.read().unwrap();
        members
            .get(&player)
            .map(|meta| meta.prefix.clone())
            .unwrap_or_default()
    }

    fn suffix(&self, player: PlayerId) -> String {
        let members = self.members.read().unwrap();
        members
            .get(&player)
            .map(|meta| meta.suffix.clone())
            .unwrap_or_default()
    }
}

pub struct ChatFormats {
    formats: Vec<GroupFormat>,
    fallback: String,
}

impl ChatFormats {
    pub fn new(formats: Vec<GroupFormat>, fallback: String) -> Self {
        Self { formats, fallback }
    }

    /// First configured format whose group the player is in, else the fallback.
    pub fn select(&self, player_groups: &[String]) -> &str {
        self.formats
            .iter()
            .find(|entry| {
                player_groups
                    .iter()
                    .any(|group| group.eq_ignore_ascii_case(&entry.group))
            })
            .map(|entry| entry.format.as_str())
            .unwrap_or(&self.fallback)
    }

    /// Fills `{PREFIX}`, `{PLAYER}`, `{SUFFIX}` and `{MESSAGE}`.
    pub fn render(
        &self,
        provider: &dyn GroupProvider,
        player: PlayerId,
        name: &str,
        message: &str,
    ) -> String {
        let groups = provider.groups(player);
        self.select(&groups)
            .replace("{PREFIX}", &provider.prefix(player))
            .replace("{PLAYER}", name)
            .replace("{SUFFIX}", &provider.suffix(player))
            .replace("{MESSAGE}", message)
    }
}
