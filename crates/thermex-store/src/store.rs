//! Main store implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{STORAGE_VERSION, StoredBlob};

enum Backend {
    Directory(PathBuf),
    Memory(Mutex<BTreeMap<String, StoredBlob>>),
}

/// Key-value store of JSON blobs.
///
/// Each key is persisted as `<dir>/<key>.json`. Writes go to a temporary file
/// that is renamed over the target, so a crash never leaves a half-written
/// blob behind.
pub struct Store {
    backend: Backend,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backend {
            Backend::Directory(dir) => f.debug_struct("Store").field("dir", dir).finish(),
            Backend::Memory(_) => f.debug_struct("Store").field("dir", &"<memory>").finish(),
        }
    }
}

impl Store {
    /// Open or create a store in the given directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();

        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| Error::CreateDirectory {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening store at {}", dir.display());
        Ok(Self {
            backend: Backend::Directory(dir.to_path_buf()),
        })
    }

    /// Open the default store location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_store_dir())
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(BTreeMap::new())),
        }
    }

    /// Directory backing this store, if it is file-based.
    pub fn dir(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Directory(dir) => Some(dir),
            Backend::Memory(_) => None,
        }
    }

    /// Load the blob stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing has been saved yet.
    pub fn load(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let blob = match &self.backend {
            Backend::Directory(dir) => {
                let path = blob_path(dir, key);
                let text = match std::fs::read_to_string(&path) {
                    Ok(text) => text,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        debug!("No stored blob for {key}");
                        return Ok(None);
                    }
                    Err(e) => return Err(e.into()),
                };
                serde_json::from_str::<StoredBlob>(&text)?
            }
            Backend::Memory(map) => match lock(map).get(key) {
                Some(blob) => blob.clone(),
                None => return Ok(None),
            },
        };

        if blob.version != STORAGE_VERSION {
            return Err(Error::UnsupportedVersion {
                key: key.to_string(),
                found: blob.version,
                expected: STORAGE_VERSION,
            });
        }
        if blob.key != key {
            warn!("Blob for {key} was saved under key {}", blob.key);
        }
        Ok(Some(blob.data))
    }

    /// Save `data` under `key`, replacing any previous blob.
    pub fn save(&self, key: &str, data: &Value) -> Result<()> {
        validate_key(key)?;
        let blob = StoredBlob::new(key, data.clone());
        match &self.backend {
            Backend::Directory(dir) => {
                let path = blob_path(dir, key);
                let tmp = path.with_extension("json.tmp");
                let text = serde_json::to_string_pretty(&blob)?;
                std::fs::write(&tmp, text)?;
                std::fs::rename(&tmp, &path)?;
                debug!("Saved {key} to {}", path.display());
            }
            Backend::Memory(map) => {
                lock(map).insert(key.to_string(), blob);
            }
        }
        Ok(())
    }

    /// Remove the blob stored under `key`.
    ///
    /// Returns `true` if something was removed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        match &self.backend {
            Backend::Directory(dir) => match std::fs::remove_file(blob_path(dir, key)) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            },
            Backend::Memory(map) => Ok(lock(map).remove(key).is_some()),
        }
    }

    /// List stored keys in sorted order.
    pub fn keys(&self) -> Result<Vec<String>> {
        match &self.backend {
            Backend::Directory(dir) => {
                let mut keys = Vec::new();
                for entry in std::fs::read_dir(dir)? {
                    let path = entry?.path();
                    if path.extension().is_some_and(|ext| ext == "json")
                        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                    {
                        keys.push(stem.to_string());
                    }
                }
                keys.sort();
                Ok(keys)
            }
            Backend::Memory(map) => Ok(lock(map).keys().cloned().collect()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn blob_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory();
        assert!(store.dir().is_none());
        assert!(store.load("thermex_abc_runtime").unwrap().is_none());
    }

    #[test]
    fn test_memory_save_and_load() {
        let store = Store::open_in_memory();
        let data = json!({"runtime_hours": 1.5, "last_preset": "high"});
        store.save("thermex_abc_runtime", &data).unwrap();
        assert_eq!(store.load("thermex_abc_runtime").unwrap(), Some(data));
        assert_eq!(store.keys().unwrap(), vec!["thermex_abc_runtime"]);
        assert!(store.remove("thermex_abc_runtime").unwrap());
        assert!(!store.remove("thermex_abc_runtime").unwrap());
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("nested")).unwrap();

        let data = json!({"runtime_hours": 12.25, "last_reset": null});
        store.save("entry1", &data).unwrap();
        assert!(dir.path().join("nested/entry1.json").exists());
        assert!(!dir.path().join("nested/entry1.json.tmp").exists());

        let reopened = Store::open(dir.path().join("nested")).unwrap();
        assert_eq!(reopened.load("entry1").unwrap(), Some(data));
        assert_eq!(reopened.keys().unwrap(), vec!["entry1"]);
    }

    #[test]
    fn test_file_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.save("k", &json!({"v": 1})).unwrap();
        store.save("k", &json!({"v": 2})).unwrap();
        assert_eq!(store.load("k").unwrap(), Some(json!({"v": 2})));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        assert!(matches!(store.load("bad"), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        std::fs::write(
            dir.path().join("old.json"),
            r#"{"version":9,"key":"old","saved_at":"2024-01-01T00:00:00Z","data":{}}"#,
        )
        .unwrap();
        assert!(matches!(
            store.load("old"),
            Err(Error::UnsupportedVersion { found: 9, .. })
        ));
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let store = Store::open_in_memory();
        for key in ["", "../escape", ".hidden", "a/b", "with space"] {
            assert!(
                matches!(store.save(key, &json!({})), Err(Error::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }
}
