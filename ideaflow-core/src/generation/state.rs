//! Durable per-idea generation state.
//!
//! Each in-flight generation is recorded under its idea id in a single JSON
//! file. Every operation re-reads the file under a lock and rewrites it via
//! temp file + rename, so two processes working on different ideas never
//! clobber each other's entries.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Persisted record of one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationState {
    /// Set once the generation endpoint has accepted the request
    pub prototype_id: Option<String>,
    pub prd_id: String,
    pub idea_id: String,
    pub start_time: DateTime<Utc>,
    pub is_generating: bool,
    /// Bumped on every write; guards against a second claimant
    #[serde(default)]
    pub version: u64,
}

impl GenerationState {
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.start_time > window
    }
}

type Entries = BTreeMap<String, GenerationState>;

/// Keyed store of generation states.
pub struct StateStore {
    path: Option<PathBuf>,
    entries: Mutex<Entries>,
}

impl StateStore {
    /// Open the store backed by `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries = read_entries(&path)?;
        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            "Opened generation state store"
        );
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// A store that lives only as long as the process (for testing)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Entries::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a new generation for `idea_id`.
    ///
    /// Fails with [`Error::AlreadyGenerating`] while another generation for
    /// the same idea is in flight and younger than `stale_after`. Stale or
    /// finished entries are replaced.
    pub fn claim(
        &self,
        prd_id: &str,
        idea_id: &str,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<GenerationState> {
        self.update(|entries| {
            let version = match entries.get(idea_id) {
                Some(existing)
                    if existing.is_generating && !existing.is_stale(now, stale_after) =>
                {
                    return Err(Error::AlreadyGenerating(idea_id.to_string()));
                }
                Some(existing) => {
                    tracing::info!(
                        idea_id,
                        started = %existing.start_time,
                        "Replacing stale generation state"
                    );
                    existing.version + 1
                }
                None => 1,
            };

            let state = GenerationState {
                prototype_id: None,
                prd_id: prd_id.to_string(),
                idea_id: idea_id.to_string(),
                start_time: now,
                is_generating: true,
                version,
            };
            entries.insert(idea_id.to_string(), state.clone());
            Ok(state)
        })
    }

    /// Attach the prototype id returned by the generation endpoint.
    ///
    /// `version` must match the stored entry, otherwise the slot was claimed
    /// by someone else in the meantime.
    pub fn attach_prototype(
        &self,
        idea_id: &str,
        version: u64,
        prototype_id: &str,
    ) -> Result<GenerationState> {
        self.update(|entries| {
            let entry = entries
                .get_mut(idea_id)
                .filter(|entry| entry.version == version)
                .ok_or_else(|| Error::AlreadyGenerating(idea_id.to_string()))?;
            entry.prototype_id = Some(prototype_id.to_string());
            entry.version += 1;
            Ok(entry.clone())
        })
    }

    pub fn get(&self, idea_id: &str) -> Result<Option<GenerationState>> {
        self.read(|entries| entries.get(idea_id).cloned())
    }

    /// All persisted states, ordered by idea id.
    pub fn list(&self) -> Result<Vec<GenerationState>> {
        self.read(|entries| entries.values().cloned().collect())
    }

    /// Drop the entry for `idea_id` if it still has `version`.
    pub fn release(&self, idea_id: &str, version: u64) -> Result<bool> {
        self.update(|entries| {
            if entries.get(idea_id).is_some_and(|e| e.version == version) {
                entries.remove(idea_id);
                Ok(true)
            } else {
                Ok(false)
            }
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Entries) -> T) -> Result<T> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(path) = &self.path {
            *entries = read_entries(path)?;
        }
        Ok(f(&entries))
    }

    fn update<T>(&self, f: impl FnOnce(&mut Entries) -> Result<T>) -> Result<T> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(path) = &self.path {
            *entries = read_entries(path)?;
        }
        let value = f(&mut entries)?;
        if let Some(path) = &self.path {
            write_entries(path, &entries)?;
        }
        Ok(value)
    }
}

fn read_entries(path: &Path) -> Result<Entries> {
    match fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Entries::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_entries(path: &Path, entries: &Entries) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("generation_state.json");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_claim_rejects_in_flight_generation() {
        let store = StateStore::in_memory();
        let window = Duration::hours(1);

        let first = store.claim("prd-1", "idea-1", now(), window).unwrap();
        assert_eq!(first.version, 1);
        assert!(first.is_generating);

        let err = store
            .claim("prd-2", "idea-1", now() + Duration::minutes(5), window)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyGenerating(ref id) if id == "idea-1"));

        // other ideas are independent
        store.claim("prd-3", "idea-2", now(), window).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_stale_claim_is_replaced() {
        let store = StateStore::in_memory();
        let window = Duration::hours(1);
        store.claim("prd-1", "idea-1", now(), window).unwrap();

        let later = now() + Duration::hours(2);
        let second = store.claim("prd-2", "idea-1", later, window).unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.prd_id, "prd-2");
        assert_eq!(second.start_time, later);
    }

    #[test]
    fn test_attach_requires_matching_version() {
        let store = StateStore::in_memory();
        let claimed = store
            .claim("prd-1", "idea-1", now(), Duration::hours(1))
            .unwrap();

        let attached = store
            .attach_prototype("idea-1", claimed.version, "proto-1")
            .unwrap();
        assert_eq!(attached.prototype_id.as_deref(), Some("proto-1"));
        assert_eq!(attached.version, claimed.version + 1);

        assert!(store
            .attach_prototype("idea-1", claimed.version, "proto-2")
            .is_err());
    }

    #[test]
    fn test_release_only_drops_own_version() {
        let store = StateStore::in_memory();
        let state = store
            .claim("prd-1", "idea-1", now(), Duration::hours(1))
            .unwrap();

        assert!(!store.release("idea-1", state.version + 7).unwrap());
        assert!(store.get("idea-1").unwrap().is_some());
        assert!(store.release("idea-1", state.version).unwrap());
        assert!(store.get("idea-1").unwrap().is_none());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("generation_state.json");

        {
            let store = StateStore::open(&path).unwrap();
            let state = store
                .claim("prd-1", "idea-1", now(), Duration::hours(1))
                .unwrap();
            store
                .attach_prototype("idea-1", state.version, "proto-1")
                .unwrap();
        }

        let reopened = StateStore::open(&path).unwrap();
        let state = reopened.get("idea-1").unwrap().unwrap();
        assert_eq!(state.prototype_id.as_deref(), Some("proto-1"));
        assert_eq!(state.start_time, now());

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"prototypeId\""));
        assert!(raw.contains("\"isGenerating\""));
    }

    #[test]
    fn test_two_handles_share_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("generation_state.json");
        let a = StateStore::open(&path).unwrap();
        let b = StateStore::open(&path).unwrap();

        a.claim("prd-1", "idea-1", now(), Duration::hours(1)).unwrap();
        b.claim("prd-2", "idea-2", now(), Duration::hours(1)).unwrap();
        assert!(b
            .claim("prd-1", "idea-1", now(), Duration::hours(1))
            .is_err());
        assert_eq!(a.list().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("generation_state.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(StateStore::open(&path), Err(Error::Json(_))));
    }
}
