//! Server-wide warps and the spawn point, kept in `warps.yml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, WarpError};
use crate::model::{Location, normalize_name};
use crate::storage::{load_yaml_file, save_yaml_file};

const WARPS_FILE_NAME: &str = "warps.yml";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct WarpFile {
    #[serde(default)]
    spawn: Option<Location>,
    #[serde(default)]
    warps: BTreeMap<String, Location>,
}

pub struct WarpBook {
    /// `None` keeps everything in memory.
    path: Option<PathBuf>,
    file: Mutex<WarpFile>,
}

impl WarpBook {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            file: Mutex::new(WarpFile::default()),
        }
    }

    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join(WARPS_FILE_NAME);
        let file = load_yaml_file::<WarpFile>(&path)?;
        log::debug!(
            "loaded {} warps from {} (spawn {})",
            file.warps.len(),
            path.display(),
            if file.spawn.is_some() { "set" } else { "unset" }
        );
        Ok(Self {
            path: Some(path),
            file: Mutex::new(file),
        })
    }

    /// Applies `change` to a copy, writes it out, and only then makes it
    /// current. A failed write leaves the book as it was.
    fn modify<R>(
        &self,
        change: impl FnOnce(&mut WarpFile) -> Result<R, WarpError>,
    ) -> Result<R, WarpError> {
        let mut file = self.file.lock().unwrap();
        let mut next = file.clone();
        let result = change(&mut next)?;
        if let Some(path) = &self.path {
            save_yaml_file(path, &next).map_err(|err| {
                log::error!("could not save {}: {err}", path.display());
                WarpError::Save(err.to_string())
            })?;
        }
        *file = next;
        Ok(result)
    }

    /// Creates or moves a warp. Returns whether it was new.
    pub fn set_warp(&self, name: &str, location: Location) -> Result<bool, WarpError> {
        let name = normalize_name(name).ok_or(WarpError::InvalidName)?;
        self.modify(|file| Ok(file.warps.insert(name, location).is_none()))
    }

    pub fn delete_warp(&self, name: &str) -> Result<(), WarpError> {
        let name = normalize_name(name).ok_or(WarpError::InvalidName)?;
        self.modify(|file| {
            file.warps
                .remove(&name)
                .map(|_| ())
                .ok_or(WarpError::UnknownWarp)
        })
    }

    pub fn warp(&self, name: &str) -> Result<Location, WarpError> {
        let name = normalize_name(name).ok_or(WarpError::InvalidName)?;
        self.file
            .lock()
            .unwrap()
            .warps
            .get(&name)
            .cloned()
            .ok_or(WarpError::UnknownWarp)
    }

    /// Warp names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.file.lock().unwrap().warps.keys().cloned().collect()
    }

    pub fn set_spawn(&self, location: Location) -> Result<(), WarpError> {
        self.modify(|file| {
            file.spawn = Some(location);
            Ok(())
        })
    }

    pub fn spawn(&self) -> Result<Location, WarpError> {
        self.file
            .lock()
            .unwrap()
            .spawn
            .clone()
            .ok_or(WarpError::NoSpawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;

    fn at(x: f64) -> Location {
        Location::new("overworld", Position::new(x, 80.0, 0.0))
    }

    #[test]
    fn warps_and_spawn_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let book = WarpBook::open(dir.path()).unwrap();
        assert_eq!(book.set_warp("Market", at(1.0)), Ok(true));
        assert_eq!(book.set_warp("market", at(2.0)), Ok(false));
        book.set_warp("arena", at(3.0)).unwrap();
        book.set_spawn(at(0.0)).unwrap();

        let reopened = WarpBook::open(dir.path()).unwrap();
        assert_eq!(reopened.names(), vec!["arena".to_string(), "market".to_string()]);
        assert_eq!(reopened.warp("MARKET"), Ok(at(2.0)));
        assert_eq!(reopened.spawn(), Ok(at(0.0)));
    }

    #[test]
    fn missing_entries_and_bad_names_are_reported() {
        let book = WarpBook::in_memory();
        assert_eq!(book.spawn(), Err(WarpError::NoSpawn));
        assert_eq!(book.warp("nowhere"), Err(WarpError::UnknownWarp));
        assert_eq!(book.delete_warp("nowhere"), Err(WarpError::UnknownWarp));
        assert_eq!(book.set_warp("two words", at(1.0)), Err(WarpError::InvalidName));

        book.set_warp("hub", at(1.0)).unwrap();
        book.delete_warp("hub").unwrap();
        assert!(book.names().is_empty());
    }

    #[test]
    fn failed_save_leaves_the_book_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every write fail.
        std::fs::create_dir_all(dir.path().join("warps.yml.tmp")).unwrap();
        let book = WarpBook::open(dir.path()).unwrap();

        assert!(matches!(book.set_warp("hub", at(1.0)), Err(WarpError::Save(_))));
        assert_eq!(book.warp("hub"), Err(WarpError::UnknownWarp));
    }
}
