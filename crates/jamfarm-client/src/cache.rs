//! Status cache with a freshness window.
//!
//! Snapshots are keyed by `host:port`. An entry is served while it is younger
//! than the freshness window. When a directory is configured, entries are
//! also written there as JSON so separate CLI invocations share them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jamfarm_core::StatusSnapshot;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{ClientError, ClientResult};

/// Default freshness window.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(5);

/// A cached snapshot and when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub snapshot: StatusSnapshot,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(snapshot: StatusSnapshot) -> Self {
        Self::fetched_at(snapshot, Utc::now())
    }

    pub fn fetched_at(snapshot: StatusSnapshot, fetched_at: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            fetched_at,
        }
    }

    /// Age of the entry at `now`. Entries from the future count as brand new.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns true if the entry is still inside `freshness` at `now`.
    pub fn is_fresh(&self, freshness: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) < freshness
    }
}

/// Snapshot cache keyed by server.
#[derive(Debug)]
pub struct StatusCache {
    freshness: Duration,
    entries: HashMap<String, CacheEntry>,
    directory: Option<PathBuf>,
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS)
    }
}

impl StatusCache {
    /// Creates an in-memory cache.
    pub fn new(freshness: Duration) -> Self {
        Self {
            freshness,
            entries: HashMap::new(),
            directory: None,
        }
    }

    /// Builder: persist entries as JSON files under `directory`.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Returns a fresh snapshot for `key`, if any.
    pub fn get_fresh(&mut self, key: &str) -> Option<StatusSnapshot> {
        self.get_fresh_at(key, Utc::now())
    }

    /// Returns a snapshot for `key` that is fresh at `now`.
    ///
    /// Falls back to the on-disk copy when the key is not in memory.
    pub fn get_fresh_at(&mut self, key: &str, now: DateTime<Utc>) -> Option<StatusSnapshot> {
        if !self.entries.contains_key(key) {
            if let Some(entry) = self.load(key) {
                trace!(key = %key, "loaded cache entry from disk");
                self.entries.insert(key.to_string(), entry);
            }
        }

        let entry = self.entries.get(key)?;
        if entry.is_fresh(self.freshness, now) {
            Some(entry.snapshot.clone())
        } else {
            trace!(key = %key, age_ms = entry.age(now).as_millis() as u64, "cache entry stale");
            None
        }
    }

    /// Stores a snapshot fetched now.
    pub fn insert(&mut self, key: impl Into<String>, snapshot: StatusSnapshot) {
        self.insert_entry(key, CacheEntry::new(snapshot));
    }

    /// Stores an entry, persisting it if a directory is configured.
    ///
    /// Stale entries are evicted from memory first. Persistence failures are
    /// logged; the in-memory entry is kept.
    pub fn insert_entry(&mut self, key: impl Into<String>, entry: CacheEntry) {
        let key = key.into();
        self.evict_stale();
        if let Err(e) = self.persist(&key, &entry) {
            warn!(key = %key, error = %e, "failed to persist cache entry");
        }
        debug!(key = %key, "cached status");
        self.entries.insert(key, entry);
    }

    /// Removes an entry from memory and disk.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        if let Some(path) = self.entry_path(key) {
            match fs::remove_file(&path) {
                Ok(()) => trace!(path = %path.display(), "removed cache file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove cache file"),
            }
        }
        self.entries.remove(key)
    }

    /// Drops in-memory entries that are no longer fresh.
    pub fn evict_stale(&mut self) -> usize {
        self.evict_stale_at(Utc::now())
    }

    /// Drops in-memory entries that are not fresh at `now`.
    pub fn evict_stale_at(&mut self, now: DateTime<Utc>) -> usize {
        let freshness = self.freshness;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(freshness, now));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted stale cache entries");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of the JSON file backing `key`.
    pub fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.directory
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", file_stem(key))))
    }

    fn persist(&self, key: &str, entry: &CacheEntry) -> ClientResult<()> {
        let (Some(dir), Some(path)) = (self.directory.as_ref(), self.entry_path(key)) else {
            return Ok(());
        };

        fs::create_dir_all(dir)?;
        let json = serde_json::to_vec_pretty(entry)
            .map_err(|e| ClientError::cache(format!("failed to serialize entry: {}", e)))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key)?;
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache file");
                return None;
            }
        };

        match serde_json::from_slice(&data) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache file");
                None
            }
        }
    }
}

/// Turns a `host:port` key into a safe file name.
///
/// ASCII letters, digits, `.` and `-` are kept; every other byte becomes
/// `_XX` in hex. `_` is itself escaped, so distinct keys never share a file.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{:02X}", byte));
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamfarm_core::UserEntry;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot::new()
            .with_topic("Friday jam")
            .with_tempo(120, 16)
            .with_user(UserEntry::new("alice").with_channel("bass"))
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn entry_freshness_window() {
        let t0 = Utc::now();
        let entry = CacheEntry::fetched_at(snapshot(), t0);

        assert!(entry.is_fresh(Duration::from_secs(5), t0 + secs(4)));
        assert!(!entry.is_fresh(Duration::from_secs(5), t0 + secs(5)));
        assert!(entry.is_fresh(Duration::from_secs(5), t0 - secs(10)));
    }

    #[test]
    fn get_fresh_and_stale() {
        let t0 = Utc::now();
        let mut cache = StatusCache::new(Duration::from_secs(5));
        cache.insert_entry("jam:2049", CacheEntry::fetched_at(snapshot(), t0));

        assert_eq!(cache.get_fresh_at("jam:2049", t0 + secs(1)), Some(snapshot()));
        assert_eq!(cache.get_fresh_at("jam:2049", t0 + secs(6)), None);
        assert_eq!(cache.get_fresh_at("other:2049", t0), None);
    }

    #[test]
    fn evict_stale_entries() {
        let t0 = Utc::now();
        let mut cache = StatusCache::new(Duration::from_secs(5));
        cache.insert_entry("a:2049", CacheEntry::fetched_at(snapshot(), t0));
        cache.insert_entry("b:2049", CacheEntry::fetched_at(snapshot(), t0 + secs(3)));

        assert_eq!(cache.evict_stale_at(t0 + secs(6)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_fresh_at("b:2049", t0 + secs(6)).is_some());
    }

    #[test]
    fn insert_evicts_stale_entries() {
        let mut cache = StatusCache::new(Duration::from_secs(5));
        cache.insert_entry(
            "old:2049",
            CacheEntry::fetched_at(snapshot(), Utc::now() - secs(60)),
        );
        assert_eq!(cache.len(), 1);

        cache.insert("new:2049", snapshot());
        assert_eq!(cache.len(), 1);
        assert!(cache.get_fresh("new:2049").is_some());
    }

    #[test]
    fn file_stem_is_safe() {
        assert_eq!(file_stem("jam.example.net:2049"), "jam.example.net_3A2049");
        assert_eq!(file_stem("[::1]:2050"), "_5B_3A_3A1_5D_3A2050");
        assert_eq!(file_stem("../x"), ".._2Fx");
    }

    #[test]
    fn file_stems_do_not_collide() {
        assert_ne!(file_stem("a:1"), file_stem("a_1"));
        assert_ne!(file_stem("a:1"), file_stem("a/1"));

        let dir = tempfile::tempdir().unwrap();
        let mut cache = StatusCache::new(Duration::from_secs(60)).with_directory(dir.path());
        cache.insert("a:1", StatusSnapshot::new().with_topic("colon"));
        cache.insert("a_1", StatusSnapshot::new().with_topic("underscore"));

        let mut reader = StatusCache::new(Duration::from_secs(60)).with_directory(dir.path());
        assert_eq!(reader.get_fresh("a:1").unwrap().topic.as_deref(), Some("colon"));
        assert_eq!(reader.get_fresh("a_1").unwrap().topic.as_deref(), Some("underscore"));
    }

    #[test]
    fn persisted_entry_survives_new_cache() {
        let dir = tempfile::tempdir().unwrap();

        let mut writer = StatusCache::new(Duration::from_secs(60)).with_directory(dir.path());
        writer.insert("jam.example.net:2049", snapshot());
        assert!(dir.path().join("jam.example.net_3A2049.json").exists());

        let mut reader = StatusCache::new(Duration::from_secs(60)).with_directory(dir.path());
        assert!(reader.is_empty());
        assert_eq!(reader.get_fresh("jam.example.net:2049"), Some(snapshot()));
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn persisted_stale_entry_is_not_served() {
        let dir = tempfile::tempdir().unwrap();

        let mut writer = StatusCache::new(Duration::from_secs(5)).with_directory(dir.path());
        writer.insert_entry(
            "jam:2049",
            CacheEntry::fetched_at(snapshot(), Utc::now() - secs(30)),
        );

        let mut reader = StatusCache::new(Duration::from_secs(5)).with_directory(dir.path());
        assert_eq!(reader.get_fresh("jam:2049"), None);
    }

    #[test]
    fn corrupt_cache_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = StatusCache::new(Duration::from_secs(60)).with_directory(dir.path());
        fs::write(cache.entry_path("jam:2049").unwrap(), b"{ not json").unwrap();

        assert_eq!(cache.get_fresh("jam:2049"), None);
    }

    #[test]
    fn remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = StatusCache::new(Duration::from_secs(60)).with_directory(dir.path());
        cache.insert("jam:2049", snapshot());

        assert!(cache.remove("jam:2049").is_some());
        assert!(!cache.entry_path("jam:2049").unwrap().exists());
        assert!(cache.get_fresh("jam:2049").is_none());
    }

    #[test]
    fn directory_created_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        let mut cache = StatusCache::new(Duration::from_secs(60)).with_directory(&nested);
        cache.insert("jam:2049", snapshot());
        assert!(nested.join("jam_3A2049.json").exists());
    }
}
