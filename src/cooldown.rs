use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::model::PlayerId;

pub const CATEGORY_TELEPORT: &str = "teleport";
pub const CATEGORY_TPA: &str = "tpa";
pub const CATEGORY_HOME: &str = "home";

pub fn kit_category(kit: &str) -> String {
    format!("kit:{kit}")
}

/// Per-player "category -> next allowed instant" map.
///
/// A missing entry means no cooldown. Expired entries are dropped when they
/// are looked at; there is no background sweeper.
#[derive(Default)]
pub struct CooldownTracker {
    entries: Mutex<HashMap<PlayerId, HashMap<String, Instant>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time left before `category` may be used again, if any.
    pub fn remaining(&self, player: PlayerId, category: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let per_player = entries.get_mut(&player)?;
        let until = *per_player.get(category)?;
        if until > now {
            return Some(until - now);
        }
        per_player.remove(category);
        if per_player.is_empty() {
            entries.remove(&player);
        }
        None
    }

    pub fn is_on_cooldown(&self, player: PlayerId, category: &str) -> bool {
        self.remaining(player, category).is_some()
    }

    /// Starts (or restarts) a cooldown. A zero duration creates nothing.
    pub fn trigger(&self, player: PlayerId, category: &str, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        self.trigger_until(player, category, Instant::now() + duration);
    }

    pub fn trigger_until(&self, player: PlayerId, category: &str, until: Instant) {
        if until <= Instant::now() {
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(player)
            .or_default()
            .insert(category.to_string(), until);
    }

    /// Checks and triggers under one lock. Returns the remaining time when
    /// the player is still cooling down.
    pub fn try_acquire(
        &self,
        player: PlayerId,
        category: &str,
        duration: Duration,
    ) -> Result<(), Duration> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let per_player = entries.entry(player).or_default();
        if let Some(until) = per_player.get(category).copied() {
            if until > now {
                return Err(until - now);
            }
            per_player.remove(category);
        }
        if !duration.is_zero() {
            per_player.insert(category.to_string(), now + duration);
        }
        if per_player.is_empty() {
            entries.remove(&player);
        }
        Ok(())
    }

    pub fn clear(&self, player: PlayerId, category: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(per_player) = entries.get_mut(&player) {
            per_player.remove(category);
            if per_player.is_empty() {
                entries.remove(&player);
            }
        }
    }

    /// Active cooldowns of one player whose category starts with `prefix`.
    pub fn active(&self, player: PlayerId, prefix: &str) -> Vec<(String, Duration)> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap();
        let Some(per_player) = entries.get(&player) else {
            return Vec::new();
        };
        per_player
            .iter()
            .filter(|(category, until)| category.starts_with(prefix) && **until > now)
            .map(|(category, until)| (category.clone(), *until - now))
            .collect()
    }

    pub fn remove_player(&self, player: PlayerId) {
        self.entries.lock().unwrap().remove(&player);
    }

    pub fn has_player(&self, player: PlayerId) -> bool {
        self.entries.lock().unwrap().contains_key(&player)
    }
}

/// "2h 30m 15s", "5m 30s", "45s", or "Ready" once nothing is left.
pub fn format_cooldown(remaining: Duration) -> String {
    let total_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    if total_secs == 0 {
        return "Ready".to_string();
    }
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
