use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use pumpkin::entity::player::Player;
use pumpkin::server::Server;
use pumpkin::world::World;
use pumpkin_util::math::vector3::Vector3;
use tokio::runtime::Handle;

use crate::model::{Location, PlayerId, Position};
use crate::world::WorldAccess;

/// Players currently connected, keyed by uuid. Filled by the join and leave
/// handlers; everything that needs a live `Player` goes through here.
pub struct OnlinePlayers {
    server: Arc<Server>,
    runtime: Handle,
    players: RwLock<HashMap<PlayerId, Arc<Player>>>,
}

impl OnlinePlayers {
    pub fn new(server: Arc<Server>, runtime: Handle) -> Self {
        Self {
            server,
            runtime,
            players: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, player: Arc<Player>) {
        self.players
            .write()
            .unwrap()
            .insert(player.gameprofile.id, player);
    }

    pub fn remove(&self, id: PlayerId) {
        self.players.write().unwrap().remove(&id);
    }

    pub fn get(&self, id: PlayerId) -> Option<Arc<Player>> {
        self.players.read().unwrap().get(&id).cloned()
    }

    pub fn name_of(&self, id: PlayerId) -> String {
        self.get(id)
            .map(|player| player.gameprofile.name.clone())
            .unwrap_or_else(|| "someone".to_string())
    }

    /// Runs player I/O on the server runtime, whatever thread asked for it.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future);
    }
}

pub fn location_of(player: &Player) -> Location {
    let pos = player.position();
    let (yaw, pitch) = player.rotation();
    Location::new(
        player.world().dimension.minecraft_name,
        Position {
            x: pos.x,
            y: pos.y,
            z: pos.z,
            yaw,
            pitch,
        },
    )
}

async fn find_world(server: &Server, name: &str) -> Option<Arc<World>> {
    server
        .worlds
        .read()
        .await
        .iter()
        .find(|world| world.dimension.minecraft_name == name)
        .cloned()
}

impl WorldAccess for OnlinePlayers {
    fn is_online(&self, player: PlayerId) -> bool {
        self.players.read().unwrap().contains_key(&player)
    }

    fn location(&self, player: PlayerId) -> Option<Location> {
        self.get(player).map(|player| location_of(&player))
    }

    fn move_player(&self, player: PlayerId, to: &Location) {
        let Some(player) = self.get(player) else {
            return;
        };
        let server = Arc::clone(&self.server);
        let to = to.clone();
        self.spawn(async move {
            let target = Vector3::new(to.position.x, to.position.y, to.position.z);
            let (yaw, pitch) = (to.position.yaw, to.position.pitch);
            if player.world().dimension.minecraft_name == to.world {
                player.request_teleport(target, yaw, pitch).await;
                return;
            }
            match find_world(&server, &to.world).await {
                Some(world) => {
                    player
                        .teleport_world(world, target, Some(yaw), Some(pitch))
                        .await;
                }
                None => log::warn!(
                    "cannot teleport {} to unknown world {}",
                    player.gameprofile.name,
                    to.world
                ),
            }
        });
    }
}
