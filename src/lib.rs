use std::path::Path;
use std::sync::Arc;

pub mod back;
pub mod cache;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod groups;
pub mod homes;
pub mod kits;
pub mod model;
pub mod notify;
pub mod scheduler;
pub mod storage;
pub mod teleport;
pub mod tpa;
pub mod warps;
pub mod world;

#[cfg(feature = "plugin")]
mod plugin;

use back::BackHistory;
use cache::{CacheSettings, PlayerDataCache};
use config::Config;
use cooldown::{CATEGORY_TELEPORT, CooldownTracker};
use error::{RequestError, StoreError, WarpError};
use groups::{ChatFormats, GroupProvider};
use homes::HomeBook;
use kits::KitBook;
use model::{BackCause, Location, PlayerId, TeleportCause};
use notify::{Notification, Notifier};
use scheduler::Scheduler;
use storage::{PlayerStore, YamlPlayerStore};
use teleport::{Destination, TeleportOrchestrator, TeleportOutcome};
use tpa::{RequestBroker, TpaSettings};
use warps::WarpBook;
use world::{SessionWorld, WorldAccess};

/// Everything a command or event handler may need, wired once at load.
pub struct Essentials {
    pub config: Config,
    pub cache: Arc<PlayerDataCache>,
    pub cooldowns: Arc<CooldownTracker>,
    pub back: Arc<BackHistory>,
    pub teleports: Arc<TeleportOrchestrator>,
    pub requests: Arc<RequestBroker>,
    pub homes: HomeBook,
    pub kits: KitBook,
    pub warps: WarpBook,
    pub chat: ChatFormats,
    pub groups: Arc<dyn GroupProvider>,
    world: Arc<SessionWorld>,
    notifier: Arc<dyn Notifier>,
    scheduler: Scheduler,
}

impl Essentials {
    /// Wires everything with warps and created kits kept in memory.
    pub fn new(
        config: Config,
        store: Arc<dyn PlayerStore>,
        world: Arc<dyn WorldAccess>,
        notifier: Arc<dyn Notifier>,
        groups: Arc<dyn GroupProvider>,
        scheduler: Scheduler,
    ) -> Arc<Self> {
        let cache = Self::cache(&config, store, &scheduler);
        let cooldowns = Arc::new(CooldownTracker::new());
        let kits = KitBook::new(&config.kits, Arc::clone(&cooldowns), Arc::clone(&cache));
        Self::assemble(
            config,
            cache,
            cooldowns,
            kits,
            WarpBook::in_memory(),
            world,
            notifier,
            groups,
            scheduler,
        )
    }

    /// Wires everything on top of the files in `data_dir`: one YAML file per
    /// player, plus `warps.yml` and `kits.yml`.
    pub fn open(
        config: Config,
        data_dir: &Path,
        world: Arc<dyn WorldAccess>,
        notifier: Arc<dyn Notifier>,
        groups: Arc<dyn GroupProvider>,
        scheduler: Scheduler,
    ) -> Result<Arc<Self>, StoreError> {
        let cache = Self::cache(&config, Arc::new(YamlPlayerStore::new(data_dir)), &scheduler);
        let cooldowns = Arc::new(CooldownTracker::new());
        let kits = KitBook::open(
            &config.kits,
            data_dir,
            Arc::clone(&cooldowns),
            Arc::clone(&cache),
        )?;
        let warps = WarpBook::open(data_dir)?;
        Ok(Self::assemble(
            config, cache, cooldowns, kits, warps, world, notifier, groups, scheduler,
        ))
    }

    fn cache(
        config: &Config,
        store: Arc<dyn PlayerStore>,
        scheduler: &Scheduler,
    ) -> Arc<PlayerDataCache> {
        PlayerDataCache::new(
            store,
            scheduler.clone(),
            CacheSettings {
                retry_attempts: config.save_retry_attempts,
                retry_backoff: config.save_retry_backoff(),
                io_timeout: config.io_timeout(),
                unload_timeout: config.unload_timeout(),
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        config: Config,
        cache: Arc<PlayerDataCache>,
        cooldowns: Arc<CooldownTracker>,
        kits: KitBook,
        warps: WarpBook,
        world: Arc<dyn WorldAccess>,
        notifier: Arc<dyn Notifier>,
        groups: Arc<dyn GroupProvider>,
        scheduler: Scheduler,
    ) -> Arc<Self> {
        let world = Arc::new(SessionWorld::new(world));
        let back = Arc::new(BackHistory::new());
        let teleports = TeleportOrchestrator::new(
            Arc::clone(&world) as _,
            Arc::clone(&notifier),
            Arc::clone(&back),
            scheduler.clone(),
            config.movement_tolerance,
            config.teleport_grace(),
        );
        let requests = RequestBroker::new(
            Arc::clone(&world) as _,
            Arc::clone(&notifier),
            Arc::clone(&cooldowns),
            Arc::clone(&teleports),
            scheduler.clone(),
            TpaSettings {
                expiry: config.tpa_expiry(),
                cooldown: config.tpa_cooldown(),
                warmup: config.teleport_warmup(),
            },
        );
        let homes = HomeBook::new(
            Arc::clone(&cache),
            Arc::clone(&cooldowns),
            config.max_homes,
            config.home_cooldown(),
        );
        let chat = ChatFormats::new(
            config.chat_formats.clone(),
            config.chat_fallback_format.clone(),
        );
        Arc::new(Self {
            config,
            cache,
            cooldowns,
            back,
            teleports,
            requests,
            homes,
            kits,
            warps,
            chat,
            groups,
            world,
            notifier,
            scheduler,
        })
    }

    /// Loads the player's data and restores their persisted kit cooldowns.
    /// A rejoin while the last quit is still saving picks that data back up.
    pub async fn join(&self, player: PlayerId) {
        self.world.rejoin(player);
        if self.cache.load_and_wait(player).await.is_some() {
            self.kits.restore(player);
        }
    }

    /// First half of a quit. Cancels everything the player has going on and
    /// hides them from new requests and teleports. Call it before the host
    /// forgets the player.
    pub fn cancel_sessions(&self, player: PlayerId) {
        self.world.begin_leave(player);
        self.teleports.remove_player(player);
        self.requests.on_player_quit(player);
        self.back.clear(player);
        self.cooldowns.remove_player(player);
    }

    /// Second half of a quit: saves and drops the player's data.
    pub async fn unload(&self, player: PlayerId) {
        self.cache.unload(player).await;
        self.world.end_leave(player);
    }

    /// Both halves of a quit. Safe to call more than once.
    pub async fn quit(&self, player: PlayerId) {
        self.cancel_sessions(player);
        self.unload(player).await;
    }

    /// Teleports with the configured warmup and teleport cooldown.
    pub fn teleport(
        &self,
        player: PlayerId,
        destination: Destination,
        cause: TeleportCause,
    ) -> Result<TeleportOutcome, RequestError> {
        if !self.world.is_online(player) {
            return Err(RequestError::NotOnline);
        }
        if let Err(remaining) =
            self.cooldowns
                .try_acquire(player, CATEGORY_TELEPORT, self.config.teleport_cooldown())
        {
            let err = RequestError::CooldownActive { remaining };
            self.deny(player, &err);
            return Err(err);
        }
        let outcome = self.teleports.request_teleport(
            player,
            destination,
            self.config.teleport_warmup(),
            cause,
        );
        if outcome == TeleportOutcome::Unavailable {
            self.cooldowns.clear(player, CATEGORY_TELEPORT);
            let err = RequestError::DestinationUnavailable;
            self.deny(player, &err);
            return Err(err);
        }
        Ok(outcome)
    }

    /// Sends the player back to where they last teleported from or died.
    pub fn back(&self, player: PlayerId) -> Option<TeleportOutcome> {
        let Some(entry) = self.back.get(player) else {
            self.deny(player, &"You have no previous location to return to.");
            return None;
        };
        self.teleport(
            player,
            Destination::Location(entry.location),
            TeleportCause::Back,
        )
        .ok()
    }

    /// Teleports to a named warp.
    pub fn warp(&self, player: PlayerId, name: &str) -> Result<TeleportOutcome, WarpError> {
        let location = self.warps.warp(name).inspect_err(|err| self.deny(player, err))?;
        Ok(self.teleport(player, Destination::Location(location), TeleportCause::Warp)?)
    }

    /// Teleports to the server spawn point.
    pub fn spawn(&self, player: PlayerId) -> Result<TeleportOutcome, WarpError> {
        let location = self.warps.spawn().inspect_err(|err| self.deny(player, err))?;
        Ok(self.teleport(player, Destination::Location(location), TeleportCause::Spawn)?)
    }

    fn deny(&self, player: PlayerId, err: &impl std::fmt::Display) {
        self.notifier.notify(
            player,
            Notification::Denied {
                reason: err.to_string(),
            },
        );
    }

    pub fn record_death(&self, player: PlayerId, location: Location) {
        self.back.record(player, location, BackCause::Died);
    }

    pub fn on_move(&self, player: PlayerId, to: &Location) {
        self.teleports.on_move(player, to);
    }

    /// True while any manager still holds state for the player.
    pub fn retains(&self, player: PlayerId) -> bool {
        self.cache.has_player(player)
            || self.cooldowns.has_player(player)
            || self.back.has_player(player)
            || self.teleports.has_player(player)
            || self.requests.has_player(player)
            || self.world.is_leaving(player)
    }

    /// Stops all timers and writes out every unsaved record.
    pub async fn shutdown(&self) {
        log::info!("JinxEssentials is shutting down...");
        self.teleports.shutdown();
        self.requests.shutdown();
        self.back.clear_all();
        self.cache.shutdown().await;
        self.scheduler.stop();
        log::info!("JinxEssentials shut down.");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::groups::NoGroups;
    use crate::model::{Position, TpaDirection};
    use crate::notify::testing::RecordingNotifier;
    use crate::storage::MemoryPlayerStore;
    use crate::world::testing::FakeWorld;

    struct Fixture {
        store: Arc<MemoryPlayerStore>,
        world: Arc<FakeWorld>,
        notifier: Arc<RecordingNotifier>,
        essentials: Arc<Essentials>,
    }

    fn fixture(config: Config) -> Fixture {
        let store = Arc::new(MemoryPlayerStore::new());
        let world = Arc::new(FakeWorld::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let essentials = Essentials::new(
            config,
            store.clone(),
            world.clone(),
            notifier.clone(),
            Arc::new(NoGroups),
            Scheduler::current(),
        );
        Fixture {
            store,
            world,
            notifier,
            essentials,
        }
    }

    fn at(x: f64) -> Location {
        Location::new("overworld", Position::new(x, 64.0, 0.0))
    }

    async fn join(f: &Fixture, x: f64) -> PlayerId {
        let id = Uuid::new_v4();
        f.world.place(id, at(x));
        f.essentials.join(id).await;
        id
    }

    #[tokio::test(start_paused = true)]
    async fn quitting_mid_warmup_cancels_and_flushes() {
        let config = Config {
            teleport_warmup_seconds: 5,
            ..Config::default()
        };
        let f = fixture(config);
        let c = join(&f, 0.0).await;
        f.essentials.homes.set_home(c, "base", at(500.0)).unwrap();
        let home = f.essentials.homes.home(c, "base").unwrap();
        f.essentials
            .teleport(c, Destination::Location(home), TeleportCause::Home)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        f.essentials.quit(c).await;
        f.world.remove(c);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(f.world.moves().is_empty());
        assert!(f.store.get(c).is_some());
        assert!(!f.essentials.retains(c));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_retained_after_quit() {
        let config = Config {
            teleport_warmup_seconds: 0,
            tpa_cooldown_seconds: 30,
            ..Config::default()
        };
        let f = fixture(config);
        let a = join(&f, 0.0).await;
        let b = join(&f, 100.0).await;

        f.essentials.kits.claim(a, "starter").unwrap();
        f.essentials.requests.send_request(a, b, TpaDirection::To).unwrap();
        f.essentials.requests.accept(b, None).unwrap();
        f.essentials.requests.send_request(b, a, TpaDirection::Here).unwrap();
        assert!(f.essentials.retains(a));

        f.essentials.quit(a).await;
        f.essentials.quit(a).await;
        assert!(!f.essentials.retains(a));
        assert!(f.notifier.for_player(b).contains(&Notification::TpaVoided { other: a }));
    }

    #[tokio::test(start_paused = true)]
    async fn back_returns_to_the_pre_teleport_spot() {
        let config = Config {
            teleport_warmup_seconds: 0,
            ..Config::default()
        };
        let f = fixture(config);
        let p = join(&f, 0.0).await;

        assert_eq!(f.essentials.back(p), None);
        f.essentials
            .teleport(p, Destination::Location(at(40.0)), TeleportCause::Spawn)
            .unwrap();
        assert_eq!(f.essentials.back(p), Some(TeleportOutcome::Executed));
        assert_eq!(f.world.location(p), Some(at(0.0)));

        f.essentials.record_death(p, at(-7.0));
        f.essentials.back(p);
        assert_eq!(f.world.location(p), Some(at(-7.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn teleport_cooldown_blocks_back_to_back_use() {
        let config = Config {
            teleport_warmup_seconds: 0,
            teleport_cooldown_seconds: 10,
            ..Config::default()
        };
        let f = fixture(config);
        let p = join(&f, 0.0).await;
        f.essentials
            .teleport(p, Destination::Location(at(1.0)), TeleportCause::Spawn)
            .unwrap();
        assert!(matches!(
            f.essentials
                .teleport(p, Destination::Location(at(2.0)), TeleportCause::Spawn),
            Err(RequestError::CooldownActive { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn teleporting_to_an_offline_player_is_refused_once() {
        let config = Config {
            teleport_warmup_seconds: 0,
            teleport_cooldown_seconds: 10,
            ..Config::default()
        };
        let f = fixture(config);
        let p = join(&f, 0.0).await;
        let gone = Uuid::new_v4();

        assert_eq!(
            f.essentials
                .teleport(p, Destination::Player(gone), TeleportCause::Command),
            Err(RequestError::DestinationUnavailable)
        );
        assert_eq!(f.notifier.take().len(), 1);
        assert!(!f.essentials.cooldowns.is_on_cooldown(p, CATEGORY_TELEPORT));
        assert_eq!(
            f.essentials
                .teleport(gone, Destination::Location(at(1.0)), TeleportCause::Command),
            Err(RequestError::NotOnline)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn kit_cooldown_survives_a_relog() {
        let f = fixture(Config::default());
        let d = join(&f, 0.0).await;
        f.essentials.kits.claim(d, "starter").unwrap();
        f.essentials.quit(d).await;

        f.essentials.join(d).await;
        assert!(matches!(
            f.essentials.kits.claim(d, "starter"),
            Err(error::KitError::CooldownActive { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_and_silences_timers() {
        let f = fixture(Config::default());
        let a = join(&f, 0.0).await;
        let b = join(&f, 1.0).await;
        f.essentials.homes.set_home(a, "base", at(3.0)).unwrap();
        f.essentials.requests.send_request(a, b, TpaDirection::To).unwrap();
        f.notifier.take();

        f.essentials.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(f.notifier.take().is_empty());
        assert!(f.store.get(a).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn nobody_can_reach_a_player_while_their_quit_is_saving() {
        let config = Config {
            teleport_warmup_seconds: 0,
            ..Config::default()
        };
        let f = fixture(config);
        let a = join(&f, 0.0).await;
        let b = join(&f, 10.0).await;
        f.essentials.homes.set_home(b, "base", at(10.0)).unwrap();
        f.store.set_latency(Duration::from_secs(1));

        let quitting = {
            let essentials = Arc::clone(&f.essentials);
            tokio::spawn(async move { essentials.quit(b).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        // The host still lists b as online until the quit finishes.
        assert!(f.world.is_online(b));
        assert_eq!(
            f.essentials.requests.send_request(a, b, TpaDirection::To),
            Err(RequestError::TargetOffline)
        );
        assert_eq!(
            f.essentials
                .teleport(a, Destination::Player(b), TeleportCause::Command),
            Err(RequestError::DestinationUnavailable)
        );

        quitting.await.unwrap();
        assert!(!f.essentials.retains(b));
        assert!(f.world.moves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rejoining_before_the_quit_finishes_keeps_the_data() {
        let f = fixture(Config::default());
        let c = join(&f, 0.0).await;
        f.essentials.homes.set_home(c, "base", at(5.0)).unwrap();
        f.store.set_latency(Duration::from_secs(1));

        let quitting = {
            let essentials = Arc::clone(&f.essentials);
            tokio::spawn(async move { essentials.quit(c).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.essentials.join(c).await;
        quitting.await.unwrap();

        assert!(f.essentials.cache.is_loaded(c));
        assert_eq!(f.essentials.homes.homes(c), Ok(vec!["base".to_string()]));
        f.essentials.homes.set_home(c, "mine", at(6.0)).unwrap();
        assert!(f.world.is_online(c));
        assert!(f.essentials.retains(c));
    }

    #[tokio::test(start_paused = true)]
    async fn warps_and_spawn_teleport_with_their_causes() {
        let config = Config {
            teleport_warmup_seconds: 0,
            ..Config::default()
        };
        let f = fixture(config);
        let p = join(&f, 0.0).await;

        assert_eq!(f.essentials.spawn(p), Err(WarpError::NoSpawn));
        assert_eq!(f.essentials.warp(p, "market"), Err(WarpError::UnknownWarp));
        assert_eq!(f.notifier.take().len(), 2);

        f.essentials.warps.set_spawn(at(0.5)).unwrap();
        f.essentials.warps.set_warp("market", at(77.0)).unwrap();
        assert_eq!(f.essentials.warp(p, "Market"), Ok(TeleportOutcome::Executed));
        assert_eq!(f.world.location(p), Some(at(77.0)));
        assert_eq!(f.essentials.spawn(p), Ok(TeleportOutcome::Executed));
        assert_eq!(f.world.location(p), Some(at(0.5)));
        assert_eq!(
            f.notifier.for_player(p),
            vec![
                Notification::Teleported {
                    cause: TeleportCause::Warp
                },
                Notification::Teleported {
                    cause: TeleportCause::Spawn
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn open_reads_warps_and_created_kits_from_the_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let world = Arc::new(FakeWorld::default());
        let open = || {
            Essentials::open(
                Config::default(),
                dir.path(),
                world.clone(),
                Arc::new(RecordingNotifier::default()),
                Arc::new(NoGroups),
                Scheduler::current(),
            )
            .unwrap()
        };

        let first = open();
        first.warps.set_warp("hub", at(1.0)).unwrap();
        first
            .kits
            .create("daily", config::KitDefinition::default())
            .unwrap();
        let p = Uuid::new_v4();
        world.place(p, at(0.0));
        first.join(p).await;
        first.homes.set_home(p, "base", at(2.0)).unwrap();
        first.shutdown().await;

        let second = open();
        assert_eq!(second.warps.warp("hub"), Ok(at(1.0)));
        assert!(second.kits.kit("daily").is_some());
        second.join(p).await;
        assert_eq!(second.homes.home(p, "base"), Ok(at(2.0)));
    }
}
