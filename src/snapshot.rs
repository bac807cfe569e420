//! On-disk cache snapshot: one pretty-printed JSON document keyed by city.
//! Prior entries are carried as opaque JSON so a failed refresh never rewrites them.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::WeatherError;
use crate::weather::CityEntry;

pub const METADATA_KEY: &str = "_metadata";

/// Run statistics stored under [`METADATA_KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub last_update: DateTime<Utc>,
    pub total_cities: usize,
    pub successful_updates: usize,
    pub failed_updates: usize,
    pub available_cities: Vec<String>,
}

fn is_reserved(key: &str) -> bool {
    key.starts_with('_')
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    entries: BTreeMap<String, Value>,
}

impl CacheSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a snapshot, treating a missing or unreadable file as empty.
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("📭 No existing cache at {}, starting fresh", path.display());
                return Self::new();
            }
            Err(e) => {
                warn!("⚠️  Error loading existing data from {}: {}", path.display(), e);
                return Self::new();
            }
        };

        match serde_json::from_str::<Map<String, Value>>(&contents) {
            Ok(document) => {
                let entries: BTreeMap<String, Value> = document
                    .into_iter()
                    .filter(|(key, _)| !is_reserved(key))
                    .collect();
                info!("📦 Loaded {} cached cities from {}", entries.len(), path.display());
                Self { entries }
            }
            Err(e) => {
                warn!("⚠️  Ignoring malformed cache file {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    /// Insert or replace the entry for `city`, keyed by its lowercase name.
    pub fn insert(&mut self, city: &str, entry: &CityEntry) -> Result<(), WeatherError> {
        let value = serde_json::to_value(entry)?;
        self.entries.insert(city_key(city), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// City keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metadata(&self, successful: usize, failed: usize, now: DateTime<Utc>) -> Metadata {
        let available_cities = self.keys();
        Metadata {
            last_update: now,
            total_cities: available_cities.len(),
            successful_updates: successful,
            failed_updates: failed,
            available_cities,
        }
    }

    pub fn to_document(&self, metadata: &Metadata) -> Result<Value, WeatherError> {
        let mut document: Map<String, Value> = self
            .entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        document.insert(METADATA_KEY.to_string(), serde_json::to_value(metadata)?);
        Ok(Value::Object(document))
    }

    /// Write the whole document, replacing any previous file. Returns the size in bytes.
    pub fn save(&self, path: &Path, metadata: &Metadata) -> Result<u64, WeatherError> {
        let json = serde_json::to_string_pretty(&self.to_document(metadata)?)?;
        write_atomic(path, json.as_bytes()).map_err(|source| WeatherError::Persistence {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(json.len() as u64)
    }
}

pub fn city_key(city: &str) -> String {
    city.to_lowercase()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            info!("📁 Created data directory {}", parent.display());
        }
    }

    let temp_path = path.with_extension("tmp");
    let result = write_and_rename(&temp_path, path, bytes);
    if result.is_err() && temp_path.exists() {
        if let Err(e) = fs::remove_file(&temp_path) {
            warn!("⚠️  Could not remove {}: {}", temp_path.display(), e);
        }
    }

    result
}

fn write_and_rename(temp_path: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(temp_path, path)
}
