use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::media::{IdentifiedSound, SoundId, SoundRecord};

/// On-disk layout, rewritten as a whole on every mutation.
#[derive(Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    sounds: BTreeMap<SoundId, SoundRecord>,
    #[serde(default)]
    favorites: Vec<SoundId>,
}

/// Registry of sound records and favorite membership, mirrored to a JSON file.
///
/// Persistence failures never reach the caller: a broken file loads as an
/// empty store and a failed save leaves the in-memory state authoritative.
pub struct Store {
    path: PathBuf,
    data: StoreData,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::ensure_data_dir(&path);

        let data = match Self::read(&path) {
            Ok(Some(data)) => data,
            Ok(None) => StoreData::default(),
            Err(e) => {
                warn!("Error loading sound data from {}: {e:#}", path.display());
                Self::keep_unreadable(&path);
                StoreData::default()
            }
        };

        info!(
            "Loaded {} sounds and {} favorites from {}",
            data.sounds.len(),
            data.favorites.len(),
            path.display()
        );

        Self { path, data }
    }

    fn ensure_data_dir(path: &Path) {
        let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return;
        };

        if let Err(e) = fs::create_dir_all(dir) {
            warn!("Could not create data directory {}: {e}", dir.display());
        }
    }

    /// Copies a file that failed to load aside, so the next save cannot destroy it.
    fn keep_unreadable(path: &Path) {
        let backup = backup_path(path);
        match fs::copy(path, &backup) {
            Ok(_) => warn!("Kept unreadable sound data as {}", backup.display()),
            Err(e) => warn!("Could not back up {}: {e}", path.display()),
        }
    }

    fn read(path: &Path) -> Result<Option<StoreData>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(path).context("read data file")?;
        let mut data: StoreData = serde_json::from_str(&raw).context("parse data file")?;

        let mut seen = HashSet::with_capacity(data.favorites.len());
        data.favorites.retain(|id| seen.insert(id.clone()));

        Ok(Some(data))
    }

    fn write(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, json).context("write data file")?;
        Ok(())
    }

    fn save(&self) {
        if let Err(e) = self.write() {
            warn!("Error saving sound data to {}: {e:#}", self.path.display());
        }
    }

    /// Inserts or overwrites the record at `id`.
    ///
    /// The record's `favorite` flag decides its favorite membership.
    pub fn add_or_update(&mut self, id: SoundId, record: SoundRecord) {
        debug!("Storing sound {id}");

        let listed = self.data.favorites.contains(&id);
        if record.favorite && !listed {
            self.data.favorites.push(id.clone());
        } else if !record.favorite && listed {
            self.data.favorites.retain(|f| f != &id);
        }

        self.data.sounds.insert(id, record);
        self.save();
    }

    /// Deletes the record and purges it from the favorites.
    pub fn remove(&mut self, id: &str) -> bool {
        if self.data.sounds.remove(id).is_none() {
            return false;
        }

        debug!("Removed sound {id}");
        self.data.favorites.retain(|f| f.as_str() != id);
        self.save();
        true
    }

    pub fn get(&self, id: &str) -> Option<&SoundRecord> {
        self.data.sounds.get(id)
    }

    pub fn get_all(&self) -> &BTreeMap<SoundId, SoundRecord> {
        &self.data.sounds
    }

    pub fn contains(&self, id: &str) -> bool {
        self.data.sounds.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.data.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.sounds.is_empty()
    }

    /// Appends `id` to the favorites; false if unknown or already listed.
    pub fn add_to_favorites(&mut self, id: &str) -> bool {
        if self.is_favorite(id) {
            return false;
        }

        let Some(record) = self.data.sounds.get_mut(id) else {
            return false;
        };

        record.favorite = true;
        self.data.favorites.push(SoundId::from(id));
        self.save();
        true
    }

    pub fn remove_from_favorites(&mut self, id: &str) -> bool {
        let Some(pos) = self.data.favorites.iter().position(|f| f.as_str() == id) else {
            return false;
        };

        self.data.favorites.remove(pos);
        if let Some(record) = self.data.sounds.get_mut(id) {
            record.favorite = false;
        }
        self.save();
        true
    }

    /// Flips membership and returns the resulting state.
    pub fn toggle_favorite(&mut self, id: &str) -> bool {
        if self.is_favorite(id) {
            self.remove_from_favorites(id);
        } else {
            self.add_to_favorites(id);
        }

        self.is_favorite(id)
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.data.favorites.iter().any(|f| f.as_str() == id)
    }

    /// Favorite records in favorite order. Ids without a record are skipped.
    pub fn list_favorites(&self) -> Vec<IdentifiedSound> {
        self.data
            .favorites
            .iter()
            .filter_map(|id| {
                self.data.sounds.get(id).map(|record| IdentifiedSound {
                    id: id.clone(),
                    record: record.clone(),
                })
            })
            .collect()
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}
