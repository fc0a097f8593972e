//! In-memory player records backed by a `PlayerStore`.
//!
//! Reads and writes never run on the caller: `load` answers from memory or
//! starts a background read, `save` starts a background write. Writes are
//! coalesced per player, so at most one is in flight and at most one more
//! follows it. A record is never evicted while it still has unsaved changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::watch;

use crate::model::PlayerId;
use crate::scheduler::Scheduler;
use crate::storage::{PlayerRecord, PlayerStore};

#[derive(Clone, Copy, Debug)]
pub struct CacheSettings {
    pub retry_attempts: u32,
    /// Delay before the first retry; doubled for each later one.
    pub retry_backoff: Duration,
    pub io_timeout: Duration,
    pub unload_timeout: Duration,
}

struct Slot {
    /// Distinguishes this session's slot from an earlier one for the same player.
    generation: u64,
    /// `None` while the initial read is running.
    record: Option<PlayerRecord>,
    loaded: watch::Sender<bool>,
    dirty: bool,
    saving: bool,
    /// Bumped every time a write cycle finishes.
    flushed: watch::Sender<u64>,
    /// Ticket of the running unload and the signal its waiters share.
    unloading: Option<(u64, watch::Receiver<bool>)>,
    /// Unload gave up waiting; drop the slot as soon as it is clean.
    evict_when_clean: bool,
}

impl Slot {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            record: None,
            loaded: watch::channel(false).0,
            dirty: false,
            saving: false,
            flushed: watch::channel(0).0,
            unloading: None,
            evict_when_clean: false,
        }
    }
}

pub struct PlayerDataCache {
    store: Arc<dyn PlayerStore>,
    scheduler: Scheduler,
    settings: CacheSettings,
    slots: Mutex<HashMap<PlayerId, Slot>>,
    generations: AtomicU64,
    this: Weak<PlayerDataCache>,
}

impl PlayerDataCache {
    pub fn new(
        store: Arc<dyn PlayerStore>,
        scheduler: Scheduler,
        settings: CacheSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            store,
            scheduler,
            settings,
            slots: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    /// Returns a copy of the record if it is in memory. Otherwise starts
    /// reading it and returns `None`.
    pub fn load(&self, player: PlayerId) -> Option<PlayerRecord> {
        let mut slots = self.slots.lock().unwrap();
        self.load_locked(&mut slots, player)
    }

    fn load_locked(
        &self,
        slots: &mut HashMap<PlayerId, Slot>,
        player: PlayerId,
    ) -> Option<PlayerRecord> {
        if let Some(slot) = slots.get_mut(&player) {
            // A rejoin keeps the slot, whatever unload is still running.
            if slot.unloading.take().is_some() {
                log::debug!("{player} rejoined during unload, keeping their data");
            }
            slot.evict_when_clean = false;
            return slot.record.clone();
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        slots.insert(player, Slot::new(generation));
        let Some(this) = self.this.upgrade() else {
            return None;
        };
        self.scheduler.spawn(async move {
            let record = this.read_or_default(player).await;
            this.finish_load(player, generation, record);
        });
        None
    }

    async fn read_or_default(&self, player: PlayerId) -> PlayerRecord {
        match tokio::time::timeout(self.settings.io_timeout, self.store.read(player)).await {
            Ok(Ok(Some(record))) => record,
            Ok(Ok(None)) => PlayerRecord::default(),
            Ok(Err(err)) => {
                log::warn!("could not load data for {player}, starting empty: {err}");
                PlayerRecord::default()
            }
            Err(_) => {
                log::warn!("loading data for {player} timed out, starting empty");
                PlayerRecord::default()
            }
        }
    }

    fn finish_load(&self, player: PlayerId, generation: u64, record: PlayerRecord) {
        let mut slots = self.slots.lock().unwrap();
        match slots.get_mut(&player) {
            Some(slot) if slot.generation == generation && slot.record.is_none() => {
                slot.record = Some(record);
                slot.loaded.send_replace(true);
                log::debug!("loaded data for {player}");
            }
            _ => log::debug!("discarding stale load of {player}"),
        }
    }

    /// Loads the record and waits for it. `None` if the player was unloaded
    /// while waiting.
    pub async fn load_and_wait(&self, player: PlayerId) -> Option<PlayerRecord> {
        let mut loaded = {
            let mut slots = self.slots.lock().unwrap();
            if let Some(record) = self.load_locked(&mut slots, player) {
                return Some(record);
            }
            slots.get(&player)?.loaded.subscribe()
        };
        if loaded.wait_for(|ready| *ready).await.is_err() {
            return None;
        }
        self.read(player, PlayerRecord::clone)
    }

    pub fn read<R>(&self, player: PlayerId, f: impl FnOnce(&PlayerRecord) -> R) -> Option<R> {
        let slots = self.slots.lock().unwrap();
        slots.get(&player)?.record.as_ref().map(f)
    }

    /// Mutates a loaded record and marks it dirty. `None` if not loaded.
    pub fn update<R>(
        &self,
        player: PlayerId,
        f: impl FnOnce(&mut PlayerRecord) -> R,
    ) -> Option<R> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.get_mut(&player)?;
        let record = slot.record.as_mut()?;
        let result = f(record);
        slot.dirty = true;
        Some(result)
    }

    /// Schedules a write if the record has unsaved changes.
    pub fn save(&self, player: PlayerId) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.get_mut(&player) {
            self.start_write(player, slot);
        }
    }

    fn start_write(&self, player: PlayerId, slot: &mut Slot) {
        if !slot.dirty || slot.saving {
            return;
        }
        let Some(snapshot) = slot.record.clone() else {
            return;
        };
        let Some(this) = self.this.upgrade() else {
            return;
        };
        slot.dirty = false;
        slot.saving = true;
        let generation = slot.generation;
        self.scheduler.spawn(async move {
            let ok = this.write_with_retry(player, &snapshot).await;
            this.finish_write(player, generation, ok);
        });
    }

    async fn write_with_retry(&self, player: PlayerId, record: &PlayerRecord) -> bool {
        let attempts = self.settings.retry_attempts.max(1);
        let mut backoff = self.settings.retry_backoff;
        for attempt in 1..=attempts {
            match tokio::time::timeout(self.settings.io_timeout, self.store.write(player, record))
                .await
            {
                Ok(Ok(())) => return true,
                Ok(Err(err)) => {
                    log::warn!("saving {player} failed (attempt {attempt}/{attempts}): {err}")
                }
                Err(_) => log::warn!("saving {player} timed out (attempt {attempt}/{attempts})"),
            }
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
        false
    }

    fn finish_write(&self, player: PlayerId, generation: u64, ok: bool) {
        let mut slots = self.slots.lock().unwrap();
        let Some(slot) = slots.get_mut(&player) else {
            return;
        };
        if slot.generation != generation {
            return;
        }
        slot.saving = false;
        if ok {
            log::debug!("saved data for {player}");
            self.start_write(player, slot);
        } else {
            slot.dirty = true;
            log::error!("giving up on saving data for {player}; keeping it in memory");
        }
        slot.flushed.send_modify(|count| *count += 1);
        if slot.evict_when_clean && !slot.dirty && !slot.saving {
            slots.remove(&player);
            log::debug!("evicted {player} after a late save");
        }
    }

    /// Saves and waits until no write is in flight for the player.
    async fn flush(&self, player: PlayerId) {
        let mut flushed = {
            let mut slots = self.slots.lock().unwrap();
            let Some(slot) = slots.get_mut(&player) else {
                return;
            };
            self.start_write(player, slot);
            if !slot.saving {
                return;
            }
            slot.flushed.subscribe()
        };
        loop {
            if flushed.changed().await.is_err() {
                return;
            }
            let slots = self.slots.lock().unwrap();
            match slots.get(&player) {
                Some(slot) if slot.saving => continue,
                _ => return,
            }
        }
    }

    /// Saves the record, waits (bounded) for the write, then drops it from
    /// memory. Concurrent calls for the same player share the first one.
    pub async fn unload(&self, player: PlayerId) {
        let done = {
            let mut slots = self.slots.lock().unwrap();
            let Some(slot) = slots.get_mut(&player) else {
                return;
            };
            if let Some((_, running)) = &slot.unloading {
                Err(running.clone())
            } else {
                let ticket = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
                let (tx, rx) = watch::channel(false);
                slot.unloading = Some((ticket, rx));
                Ok((ticket, tx))
            }
        };
        let (ticket, done) = match done {
            Ok(started) => started,
            Err(mut running) => {
                let _ = running.wait_for(|finished| *finished).await;
                return;
            }
        };

        if tokio::time::timeout(self.settings.unload_timeout, self.flush(player))
            .await
            .is_err()
        {
            log::warn!("save of {player} still running after unload timeout");
        }

        {
            let mut slots = self.slots.lock().unwrap();
            let still_ours = slots
                .get(&player)
                .and_then(|slot| slot.unloading.as_ref())
                .is_some_and(|(running, _)| *running == ticket);
            if let Some(slot) = slots.get_mut(&player).filter(|_| still_ours) {
                if slot.dirty || slot.saving {
                    slot.unloading = None;
                    slot.evict_when_clean = true;
                    log::warn!("keeping unsaved data for {player} in memory");
                } else {
                    slots.remove(&player);
                    log::debug!("unloaded {player}");
                }
            }
        }
        done.send_replace(true);
    }

    /// Writes every dirty record and waits for all writes before returning.
    pub async fn shutdown(&self) {
        let players: Vec<PlayerId> = self.slots.lock().unwrap().keys().copied().collect();
        let mut lost = 0usize;
        for player in &players {
            self.flush(*player).await;
            let dirty = self
                .slots
                .lock()
                .unwrap()
                .get(player)
                .is_some_and(|slot| slot.dirty);
            if dirty {
                lost += 1;
                log::error!("could not persist data for {player} before shutdown");
            }
        }
        self.slots.lock().unwrap().clear();
        log::info!(
            "player data flushed ({} players, {lost} failed)",
            players.len()
        );
    }

    pub fn is_loaded(&self, player: PlayerId) -> bool {
        self.read(player, |_| ()).is_some()
    }

    pub fn is_dirty(&self, player: PlayerId) -> bool {
        let slots = self.slots.lock().unwrap();
        slots.get(&player).is_some_and(|slot| slot.dirty || slot.saving)
    }

    pub fn has_player(&self, player: PlayerId) -> bool {
        self.slots.lock().unwrap().contains_key(&player)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::storage::MemoryPlayerStore;

    fn settings() -> CacheSettings {
        CacheSettings {
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            io_timeout: Duration::from_secs(30),
            unload_timeout: Duration::from_secs(5),
        }
    }

    fn cache(store: &Arc<MemoryPlayerStore>) -> Arc<PlayerDataCache> {
        PlayerDataCache::new(store.clone(), Scheduler::current(), settings())
    }

    fn record_with(key: &str, value: u64) -> PlayerRecord {
        let mut record = PlayerRecord::default();
        record.set(key, &value);
        record
    }

    #[tokio::test(start_paused = true)]
    async fn load_is_lazy_then_ready() {
        let store = Arc::new(MemoryPlayerStore::new());
        let player = Uuid::new_v4();
        store.insert(player, record_with("deaths", 4));
        let cache = cache(&store);

        assert!(cache.load(player).is_none());
        let record = cache.load_and_wait(player).await.unwrap();
        assert_eq!(record.get::<u64>("deaths"), Some(4));
        assert_eq!(cache.load(player), Some(record));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_falls_back_to_an_empty_record() {
        let store = Arc::new(MemoryPlayerStore::new());
        store.fail_reads(true);
        let cache = cache(&store);
        let player = Uuid::new_v4();

        let record = cache.load_and_wait(player).await.unwrap();
        assert_eq!(record, PlayerRecord::default());
    }

    #[tokio::test(start_paused = true)]
    async fn saves_during_a_write_coalesce_into_one_more() {
        let store = Arc::new(MemoryPlayerStore::new());
        let cache = cache(&store);
        let player = Uuid::new_v4();
        cache.load_and_wait(player).await.unwrap();
        store.set_latency(Duration::from_secs(1));

        cache.update(player, |r| r.set("coins", &1u64));
        cache.save(player);
        for coins in 2..=5u64 {
            cache.update(player, |r| r.set("coins", &coins));
            cache.save(player);
        }
        cache.flush(player).await;

        assert_eq!(store.write_count(), 2);
        assert_eq!(store.get(player).unwrap().get::<u64>("coins"), Some(5));
        assert!(!cache.is_dirty(player));
    }

    #[tokio::test(start_paused = true)]
    async fn clean_records_are_not_written() {
        let store = Arc::new(MemoryPlayerStore::new());
        let cache = cache(&store);
        let player = Uuid::new_v4();
        cache.load_and_wait(player).await.unwrap();
        cache.save(player);
        cache.save(player);
        cache.flush(player).await;
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_writes_are_retried() {
        let store = Arc::new(MemoryPlayerStore::new());
        let cache = cache(&store);
        let player = Uuid::new_v4();
        cache.load_and_wait(player).await.unwrap();
        store.fail_next_writes(2);

        cache.update(player, |r| r.set("god", &true));
        cache.flush(player).await;
        assert_eq!(store.write_count(), 3);
        assert!(!cache.is_dirty(player));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_keep_the_record_dirty() {
        let store = Arc::new(MemoryPlayerStore::new());
        let cache = cache(&store);
        let player = Uuid::new_v4();
        cache.load_and_wait(player).await.unwrap();
        store.fail_next_writes(10);

        cache.update(player, |r| r.set("god", &true));
        cache.flush(player).await;
        assert_eq!(store.write_count(), 3);
        assert!(cache.is_dirty(player));

        cache.unload(player).await;
        assert!(cache.has_player(player));
    }

    #[tokio::test(start_paused = true)]
    async fn unload_flushes_then_evicts_and_merges_callers() {
        let store = Arc::new(MemoryPlayerStore::new());
        let cache = cache(&store);
        let player = Uuid::new_v4();
        cache.load_and_wait(player).await.unwrap();
        store.set_latency(Duration::from_millis(500));
        cache.update(player, |r| r.set("coins", &9u64));

        tokio::join!(cache.unload(player), cache.unload(player));

        assert_eq!(store.write_count(), 1);
        assert_eq!(store.get(player).unwrap().get::<u64>("coins"), Some(9));
        assert!(!cache.has_player(player));
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_during_unload_keeps_the_record() {
        let store = Arc::new(MemoryPlayerStore::new());
        let cache = cache(&store);
        let player = Uuid::new_v4();
        cache.load_and_wait(player).await.unwrap();
        cache.update(player, |r| r.set("coins", &7u64));
        store.set_latency(Duration::from_secs(1));

        let unloading = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.unload(player).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let record = cache.load_and_wait(player).await.unwrap();
        assert_eq!(record.get::<u64>("coins"), Some(7));
        unloading.await.unwrap();

        assert!(cache.is_loaded(player));
        cache.update(player, |r| r.set("coins", &8u64)).unwrap();
        cache.flush(player).await;
        assert_eq!(store.get(player).unwrap().get::<u64>("coins"), Some(8));
    }

    #[tokio::test(start_paused = true)]
    async fn unload_during_load_discards_the_late_read() {
        let store = Arc::new(MemoryPlayerStore::new());
        store.set_latency(Duration::from_secs(1));
        let cache = cache(&store);
        let player = Uuid::new_v4();

        assert!(cache.load(player).is_none());
        cache.unload(player).await;
        assert!(!cache.has_player(player));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!cache.has_player(player));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_save_outlives_unload_and_evicts_later() {
        let store = Arc::new(MemoryPlayerStore::new());
        let cache = cache(&store);
        let player = Uuid::new_v4();
        cache.load_and_wait(player).await.unwrap();
        store.set_latency(Duration::from_secs(10));
        cache.update(player, |r| r.set("coins", &3u64));

        cache.unload(player).await;
        assert!(cache.has_player(player));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!cache.has_player(player));
        assert_eq!(store.get(player).unwrap().get::<u64>("coins"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_writes_every_dirty_record() {
        let store = Arc::new(MemoryPlayerStore::new());
        let cache = cache(&store);
        let players: Vec<PlayerId> = (0..3).map(|_| Uuid::new_v4()).collect();
        for (i, player) in players.iter().enumerate() {
            cache.load_and_wait(*player).await.unwrap();
            cache.update(*player, |r| r.set("slot", &(i as u64)));
        }

        cache.shutdown().await;
        for (i, player) in players.iter().enumerate() {
            assert_eq!(
                store.get(*player).unwrap().get::<u64>("slot"),
                Some(i as u64)
            );
            assert!(!cache.has_player(*player));
        }
    }
}
