use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cache::PlayerDataCache;
use crate::config::{KitDefinition, KitItem};
use crate::cooldown::{CooldownTracker, kit_category};
use crate::error::{KitError, StoreError};
use crate::model::{PlayerId, normalize_name};
use crate::storage::{load_yaml_file, save_yaml_file};

/// Next allowed use per kit, in unix seconds, so cooldowns survive a relog.
const KIT_COOLDOWNS_FIELD: &str = "kit_cooldowns";
const KITS_FILE_NAME: &str = "kits.yml";

#[derive(Clone, Debug, PartialEq)]
pub struct Kit {
    pub id: String,
    pub display_name: String,
    pub cooldown: Duration,
    pub replace: bool,
    pub items: Vec<KitItem>,
}

impl Kit {
    fn from_definition(id: &str, def: &KitDefinition) -> Self {
        let display_name = if def.display_name.is_empty() {
            id.to_string()
        } else {
            def.display_name.clone()
        };
        Self {
            id: id.to_string(),
            display_name,
            cooldown: Duration::from_secs(def.cooldown_seconds),
            replace: def.replace,
            items: def.items.clone(),
        }
    }
}

/// Kits created in game, as stored in `kits.yml`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct KitFile {
    #[serde(default)]
    kits: BTreeMap<String, KitDefinition>,
}

/// Kits from `config.yml` plus the ones created in game. Config kits are
/// read-only; created kits are written to `kits.yml` on every change.
pub struct KitBook {
    configured: BTreeMap<String, Kit>,
    created: RwLock<KitFile>,
    /// `None` keeps created kits in memory only.
    path: Option<PathBuf>,
    cooldowns: Arc<CooldownTracker>,
    cache: Arc<PlayerDataCache>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl KitBook {
    pub fn new(
        definitions: &BTreeMap<String, KitDefinition>,
        cooldowns: Arc<CooldownTracker>,
        cache: Arc<PlayerDataCache>,
    ) -> Self {
        let configured = definitions
            .iter()
            .map(|(id, def)| {
                let id = id.to_ascii_lowercase();
                let kit = Kit::from_definition(&id, def);
                (id, kit)
            })
            .collect();
        Self {
            configured,
            created: RwLock::new(KitFile::default()),
            path: None,
            cooldowns,
            cache,
        }
    }

    /// Like `new`, with created kits loaded from and saved to `kits.yml`.
    pub fn open(
        definitions: &BTreeMap<String, KitDefinition>,
        data_dir: &Path,
        cooldowns: Arc<CooldownTracker>,
        cache: Arc<PlayerDataCache>,
    ) -> Result<Self, StoreError> {
        let path = data_dir.join(KITS_FILE_NAME);
        let mut file = load_yaml_file::<KitFile>(&path)?;
        let mut book = Self::new(definitions, cooldowns, cache);
        file.kits = file
            .kits
            .into_iter()
            .filter_map(|(id, def)| match normalize_name(&id) {
                Some(id) if book.configured.contains_key(&id) => {
                    log::warn!("kits.yml kit {id} is shadowed by config.yml");
                    None
                }
                Some(id) => Some((id, def)),
                None => {
                    log::warn!("ignoring kits.yml kit with invalid name {id:?}");
                    None
                }
            })
            .collect();
        book.created = RwLock::new(file);
        book.path = Some(path);
        Ok(book)
    }

    pub fn kit(&self, id: &str) -> Option<Kit> {
        let id = id.to_ascii_lowercase();
        if let Some(kit) = self.configured.get(&id) {
            return Some(kit.clone());
        }
        let created = self.created.read().unwrap();
        created.kits.get(&id).map(|def| Kit::from_definition(&id, def))
    }

    /// Every kit id, sorted.
    pub fn names(&self) -> Vec<String> {
        let created = self.created.read().unwrap();
        let mut names: Vec<String> = self
            .configured
            .keys()
            .chain(created.kits.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Adds or replaces an in-game kit. Returns whether it was new.
    pub fn create(&self, id: &str, definition: KitDefinition) -> Result<bool, KitError> {
        let id = normalize_name(id).ok_or(KitError::InvalidName)?;
        if self.configured.contains_key(&id) {
            return Err(KitError::Configured);
        }
        let mut created = self.created.write().unwrap();
        let mut next = created.clone();
        let added = next.kits.insert(id.clone(), definition).is_none();
        self.persist(&next)?;
        *created = next;
        log::info!("kit {id} {}", if added { "created" } else { "updated" });
        Ok(added)
    }

    pub fn delete(&self, id: &str) -> Result<(), KitError> {
        let id = normalize_name(id).ok_or(KitError::InvalidName)?;
        if self.configured.contains_key(&id) {
            return Err(KitError::Configured);
        }
        let mut created = self.created.write().unwrap();
        let mut next = created.clone();
        if next.kits.remove(&id).is_none() {
            return Err(KitError::UnknownKit);
        }
        self.persist(&next)?;
        *created = next;
        log::info!("kit {id} deleted");
        Ok(())
    }

    fn persist(&self, file: &KitFile) -> Result<(), KitError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        save_yaml_file(path, file).map_err(|err| {
            log::error!("could not save {}: {err}", path.display());
            KitError::Save(err.to_string())
        })
    }

    /// Starts the kit's cooldown and hands the kit back for the host to give
    /// out. Fails while the previous claim is still cooling down.
    pub fn claim(&self, player: PlayerId, id: &str) -> Result<Kit, KitError> {
        let kit = self.kit(id).ok_or(KitError::UnknownKit)?;
        let category = kit_category(&kit.id);
        self.cooldowns
            .try_acquire(player, &category, kit.cooldown)
            .map_err(|remaining| KitError::CooldownActive { remaining })?;

        if !kit.cooldown.is_zero() {
            let until = unix_now() + kit.cooldown.as_secs();
            let kit_id = kit.id.clone();
            let stored = self.cache.update(player, |record| {
                let mut cooldowns: BTreeMap<String, u64> =
                    record.get(KIT_COOLDOWNS_FIELD).unwrap_or_default();
                let now = unix_now();
                cooldowns.retain(|_, until| *until > now);
                cooldowns.insert(kit_id, until);
                record.set(KIT_COOLDOWNS_FIELD, &cooldowns);
            });
            match stored {
                Some(()) => self.cache.save(player),
                None => log::warn!("kit cooldown for {player} not persisted: data not loaded"),
            }
        }
        log::debug!("{player} claimed kit {}", kit.id);
        Ok(kit)
    }

    /// Puts persisted kit cooldowns back into the tracker after a join.
    pub fn restore(&self, player: PlayerId) {
        let stored: BTreeMap<String, u64> = self
            .cache
            .read(player, |record| record.get(KIT_COOLDOWNS_FIELD).unwrap_or_default())
            .unwrap_or_default();
        let now_unix = unix_now();
        let now = Instant::now();
        for (kit, until) in stored {
            if until > now_unix {
                let left = Duration::from_secs(until - now_unix);
                self.cooldowns
                    .trigger_until(player, &kit_category(&kit), now + left);
            }
        }
    }
}
