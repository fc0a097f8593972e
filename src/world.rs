use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::model::{Location, PlayerId};

/// Access to where players are and the ability to move them.
///
/// Implementations must not call back into the managers.
pub trait WorldAccess: Send + Sync {
    fn is_online(&self, player: PlayerId) -> bool;
    fn location(&self, player: PlayerId) -> Option<Location>;
    fn move_player(&self, player: PlayerId, to: &Location);
}

/// Wraps the host world and hides players who are disconnecting.
///
/// Between `begin_leave` and `end_leave` a player reads as offline with no
/// location, so nothing new can be started for them while their data is
/// still being written out.
pub struct SessionWorld {
    inner: Arc<dyn WorldAccess>,
    leaving: Mutex<HashMap<PlayerId, u32>>,
}

impl SessionWorld {
    pub fn new(inner: Arc<dyn WorldAccess>) -> Self {
        Self {
            inner,
            leaving: Mutex::new(HashMap::new()),
        }
    }

    pub fn begin_leave(&self, player: PlayerId) {
        *self.leaving.lock().unwrap().entry(player).or_default() += 1;
    }

    pub fn end_leave(&self, player: PlayerId) {
        let mut leaving = self.leaving.lock().unwrap();
        if let Some(count) = leaving.get_mut(&player) {
            *count -= 1;
            if *count == 0 {
                leaving.remove(&player);
            }
        }
    }

    /// A fresh session; any quit still finishing no longer hides the player.
    pub fn rejoin(&self, player: PlayerId) {
        self.leaving.lock().unwrap().remove(&player);
    }

    pub fn is_leaving(&self, player: PlayerId) -> bool {
        self.leaving.lock().unwrap().contains_key(&player)
    }
}

impl WorldAccess for SessionWorld {
    fn is_online(&self, player: PlayerId) -> bool {
        !self.is_leaving(player) && self.inner.is_online(player)
    }

    fn location(&self, player: PlayerId) -> Option<Location> {
        if self.is_leaving(player) {
            return None;
        }
        self.inner.location(player)
    }

    fn move_player(&self, player: PlayerId, to: &Location) {
        if self.is_leaving(player) {
            log::debug!("not moving {player}, they are disconnecting");
            return;
        }
        self.inner.move_player(player, to);
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Players standing at fixed locations; `move_player` just updates the map.
    #[derive(Default)]
    pub struct FakeWorld {
        players: Mutex<HashMap<PlayerId, Location>>,
        moves: Mutex<Vec<(PlayerId, Location)>>,
    }

    impl FakeWorld {
        pub fn place(&self, player: PlayerId, at: Location) {
            self.players.lock().unwrap().insert(player, at);
        }

        pub fn remove(&self, player: PlayerId) {
            self.players.lock().unwrap().remove(&player);
        }

        pub fn moves(&self) -> Vec<(PlayerId, Location)> {
            self.moves.lock().unwrap().clone()
        }
    }

    impl WorldAccess for FakeWorld {
        fn is_online(&self, player: PlayerId) -> bool {
            self.players.lock().unwrap().contains_key(&player)
        }

        fn location(&self, player: PlayerId) -> Option<Location> {
            self.players.lock().unwrap().get(&player).cloned()
        }

        fn move_player(&self, player: PlayerId, to: &Location) {
            self.players.lock().unwrap().insert(player, to.clone());
            self.moves.lock().unwrap().push((player, to.clone()));
        }
    }
}
