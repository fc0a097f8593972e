//! Durable player storage.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::PlayerId;

/// Named attributes of one player (homes, kit cooldowns, flags).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(default)]
    pub fields: BTreeMap<String, serde_yaml::Value>,
}

impl PlayerRecord {
    /// Reads a field, treating a missing or mistyped value as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.fields.get(key)?;
        match serde_yaml::from_value(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                log::warn!("ignoring malformed player field {key}: {err}");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) {
        match serde_yaml::to_value(value) {
            Ok(value) => {
                self.fields.insert(key.to_string(), value);
            }
            Err(err) => log::error!("could not encode player field {key}: {err}"),
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.fields.remove(key).is_some()
    }
}

/// Reads a server-wide YAML file, or the default when it does not exist yet.
pub fn load_yaml_file<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(err) => return Err(err.into()),
    };
    Ok(serde_yaml::from_str(&content)?)
}

pub fn save_yaml_file<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_yaml::to_string(value)?;
    let tmp = path.with_extension("yml.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// `Ok(None)` means the player has never been saved.
    async fn read(&self, player: PlayerId) -> Result<Option<PlayerRecord>, StoreError>;
    async fn write(&self, player: PlayerId, record: &PlayerRecord) -> Result<(), StoreError>;
}

/// One YAML document per player under `<data_dir>/players/<uuid>.yml`.
pub struct YamlPlayerStore {
    dir: PathBuf,
}

impl YamlPlayerStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("players"),
        }
    }

    fn path(&self, player: PlayerId) -> PathBuf {
        self.dir.join(format!("{player}.yml"))
    }
}

#[async_trait]
impl PlayerStore for YamlPlayerStore {
    async fn read(&self, player: PlayerId) -> Result<Option<PlayerRecord>, StoreError> {
        let content = match tokio::fs::read_to_string(self.path(player)).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record = serde_yaml::from_str::<PlayerRecord>(&content)?;
        Ok(Some(record))
    }

    async fn write(&self, player: PlayerId, record: &PlayerRecord) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let content = serde_yaml::to_string(record)?;
        let path = self.path(player);
        let tmp = path.with_extension("yml.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Keeps records in memory. Failures and latency can be injected.
#[derive(Default)]
pub struct MemoryPlayerStore {
    records: Mutex<HashMap<PlayerId, PlayerRecord>>,
    failing_writes: AtomicU32,
    failing_reads: AtomicBool,
    writes: AtomicUsize,
    latency: Mutex<Duration>,
}

impl MemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, player: PlayerId, record: PlayerRecord) {
        self.records.lock().unwrap().insert(player, record);
    }

    pub fn get(&self, player: PlayerId) -> Option<PlayerRecord> {
        self.records.lock().unwrap().get(&player).cloned()
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.failing_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Number of write attempts, failed ones included.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn injected_error(what: &str) -> StoreError {
        StoreError::Io(std::io::Error::other(format!("injected {what} failure")))
    }
}

#[async_trait]
impl PlayerStore for MemoryPlayerStore {
    async fn read(&self, player: PlayerId) -> Result<Option<PlayerRecord>, StoreError> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(Self::injected_error("read"));
        }
        Ok(self.get(player))
    }

    async fn write(&self, player: PlayerId, record: &PlayerRecord) -> Result<(), StoreError> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Self::injected_error("write"));
        }
        self.insert(player, record.clone());
        Ok(())
    }
}
