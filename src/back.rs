use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::{BackCause, Location, PlayerId};

#[derive(Clone, Debug, PartialEq)]
pub struct BackEntry {
    pub location: Location,
    pub cause: BackCause,
}

/// Last location before a tracked teleport or death, one per player.
#[derive(Default)]
pub struct BackHistory {
    entries: Mutex<HashMap<PlayerId, BackEntry>>,
}

impl BackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins, whatever the cause.
    pub fn record(&self, player: PlayerId, location: Location, cause: BackCause) {
        log::debug!("back location for {player} set to {location} ({cause:?})");
        self.entries
            .lock()
            .unwrap()
            .insert(player, BackEntry { location, cause });
    }

    /// The stored entry. It stays in place, so `/back` can be repeated.
    pub fn get(&self, player: PlayerId) -> Option<BackEntry> {
        self.entries.lock().unwrap().get(&player).cloned()
    }

    /// Returns the stored entry and forgets it.
    pub fn consume(&self, player: PlayerId) -> Option<BackEntry> {
        self.entries.lock().unwrap().remove(&player)
    }

    pub fn clear(&self, player: PlayerId) {
        self.entries.lock().unwrap().remove(&player);
    }

    pub fn clear_all(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn has_player(&self, player: PlayerId) -> bool {
        self.entries.lock().unwrap().contains_key(&player)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::model::Position;

    fn at(x: f64) -> Location {
        Location::new("overworld", Position::new(x, 64.0, 0.0))
    }

    #[test]
    fn death_overwrites_teleport_and_get_is_repeatable() {
        let history = BackHistory::new();
        let player = Uuid::new_v4();
        history.record(player, at(1.0), BackCause::Teleported);
        history.record(player, at(2.0), BackCause::Died);

        let entry = history.get(player).unwrap();
        assert_eq!(entry.location, at(2.0));
        assert_eq!(entry.cause, BackCause::Died);
        assert_eq!(history.get(player), Some(entry));
    }

    #[test]
    fn consume_removes_the_entry() {
        let history = BackHistory::new();
        let player = Uuid::new_v4();
        history.record(player, at(1.0), BackCause::Teleported);
        assert!(history.consume(player).is_some());
        assert!(history.consume(player).is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let history = BackHistory::new();
        let player = Uuid::new_v4();
        history.clear(player);
        history.record(player, at(1.0), BackCause::Teleported);
        history.clear(player);
        history.clear(player);
        assert!(!history.has_player(player));
    }
}
