use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::PlayerDataCache;
use crate::cooldown::{CATEGORY_HOME, CooldownTracker};
use crate::error::HomeError;
use crate::model::{Location, PlayerId, normalize_name};

const HOMES_FIELD: &str = "homes";

type Homes = BTreeMap<String, Location>;

/// Named homes, stored in each player's record.
pub struct HomeBook {
    cache: Arc<PlayerDataCache>,
    cooldowns: Arc<CooldownTracker>,
    max_homes: usize,
    cooldown: Duration,
}

fn normalize(name: &str) -> Result<String, HomeError> {
    normalize_name(name).ok_or(HomeError::InvalidName)
}

impl HomeBook {
    pub fn new(
        cache: Arc<PlayerDataCache>,
        cooldowns: Arc<CooldownTracker>,
        max_homes: usize,
        cooldown: Duration,
    ) -> Self {
        Self {
            cache,
            cooldowns,
            max_homes,
            cooldown,
        }
    }

    /// Creates or moves a home. Moving an existing home ignores the limit
    /// and the cooldown.
    pub fn set_home(
        &self,
        player: PlayerId,
        name: &str,
        location: Location,
    ) -> Result<(), HomeError> {
        let name = normalize(name)?;
        // Limit and cooldown are checked under the record lock, so two
        // concurrent new homes cannot both slip under the limit.
        self.cache
            .update(player, |record| {
                let mut homes = record.get::<Homes>(HOMES_FIELD).unwrap_or_default();
                if !homes.contains_key(&name) {
                    if homes.len() >= self.max_homes {
                        return Err(HomeError::LimitReached {
                            limit: self.max_homes,
                        });
                    }
                    self.cooldowns
                        .try_acquire(player, CATEGORY_HOME, self.cooldown)
                        .map_err(|remaining| HomeError::CooldownActive { remaining })?;
                }
                homes.insert(name.clone(), location);
                record.set(HOMES_FIELD, &homes);
                Ok(())
            })
            .ok_or(HomeError::NotLoaded)??;
        self.cache.save(player);
        log::debug!("{player} set home {name}");
        Ok(())
    }

    pub fn delete_home(&self, player: PlayerId, name: &str) -> Result<(), HomeError> {
        let name = normalize(name)?;
        let removed = self
            .cache
            .update(player, |record| {
                let mut homes = record.get::<Homes>(HOMES_FIELD).unwrap_or_default();
                let removed = homes.remove(&name).is_some();
                if removed {
                    record.set(HOMES_FIELD, &homes);
                }
                removed
            })
            .ok_or(HomeError::NotLoaded)?;
        if !removed {
            return Err(HomeError::UnknownHome);
        }
        self.cache.save(player);
        Ok(())
    }

    pub fn home(&self, player: PlayerId, name: &str) -> Result<Location, HomeError> {
        let name = normalize(name)?;
        self.cache
            .read(player, |record| record.get::<Homes>(HOMES_FIELD).unwrap_or_default())
            .ok_or(HomeError::NotLoaded)?
            .remove(&name)
            .ok_or(HomeError::UnknownHome)
    }

    /// Home names, sorted.
    pub fn homes(&self, player: PlayerId) -> Result<Vec<String>, HomeError> {
        let homes = self
            .cache
            .read(player, |record| record.get::<Homes>(HOMES_FIELD).unwrap_or_default())
            .ok_or(HomeError::NotLoaded)?;
        Ok(homes.into_keys().collect())
    }
}
