//! In-memory cache of parsed fixture documents.
//!
//! Entries are populated lazily on first read and evicted by the watcher.
//! Every eviction bumps a generation counter under the write lock. A load
//! that read disk before an eviction still returns what it read, but only
//! caches it when no eviction happened in between, so a stale read never
//! outlives the event that invalidated it.

use crate::error::FixtureError;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Parsed JSON documents keyed by their path relative to the fixture root.
pub struct FixtureStore {
    /// Canonical fixture root
    root: PathBuf,
    entries: RwLock<HashMap<PathBuf, Arc<Value>>>,
    /// Bumped on every eviction, always while holding the write lock
    generation: AtomicU64,
}

impl FixtureStore {
    /// Open a store over an existing directory.
    pub fn open(root: &Path) -> Result<Self, FixtureError> {
        let root = root.canonicalize().map_err(|source| FixtureError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        debug!(root = %root.display(), "Fixture store opened");
        Ok(Self {
            root,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }

    /// Canonical fixture root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `rel` names a regular file under the root.
    pub fn exists(&self, rel: &Path) -> bool {
        self.root.join(rel).is_file()
    }

    /// Whether `rel` names a directory under the root.
    pub fn is_dir(&self, rel: &Path) -> bool {
        self.root.join(rel).is_dir()
    }

    /// Load a document, logging and swallowing any failure.
    pub fn load(&self, rel: &Path) -> Option<Arc<Value>> {
        match self.try_load(rel) {
            Ok(doc) => Some(doc),
            Err(FixtureError::NotFound(path)) => {
                debug!(path = %path.display(), "Fixture not found");
                None
            }
            Err(FixtureError::OutsideRoot) => {
                warn!(
                    kind = "security_violation",
                    "Rejected fixture path outside the fixture root"
                );
                None
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Failed to load fixture");
                None
            }
        }
    }

    /// Load a document, returning the cached parse when there is one.
    pub fn try_load(&self, rel: &Path) -> Result<Arc<Value>, FixtureError> {
        if let Some(doc) = self.read().get(rel) {
            debug!(path = %rel.display(), "Fixture cache hit");
            return Ok(Arc::clone(doc));
        }

        let seen = self.generation();
        let doc = Arc::new(self.read_from_disk(rel)?);
        if self.insert_if_current(rel, Arc::clone(&doc), seen) {
            debug!(path = %rel.display(), "Fixture loaded from disk");
        } else {
            debug!(path = %rel.display(), "Fixture changed during load, not cached");
        }
        Ok(doc)
    }

    /// Evict one entry. Returns whether anything was cached.
    pub fn invalidate(&self, rel: &Path) -> bool {
        let removed = {
            let mut entries = self.write();
            self.generation.fetch_add(1, Ordering::AcqRel);
            entries.remove(rel).is_some()
        };
        if removed {
            debug!(path = %rel.display(), "Fixture evicted");
        }
        removed
    }

    /// Evict `rel` and every entry beneath it. Returns the number evicted.
    pub fn invalidate_tree(&self, rel: &Path) -> usize {
        let mut entries = self.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(rel));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(path = %rel.display(), evicted, "Fixture tree evicted");
        }
        evicted
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        let mut entries = self.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    /// Number of cached documents.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn read_from_disk(&self, rel: &Path) -> Result<Value, FixtureError> {
        let abs = self.contain(rel)?;
        let content = std::fs::read(&abs).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => FixtureError::NotFound(rel.to_path_buf()),
            _ => FixtureError::Io {
                path: rel.to_path_buf(),
                source,
            },
        })?;
        serde_json::from_slice(&content).map_err(|source| FixtureError::Parse {
            path: rel.to_path_buf(),
            source,
        })
    }

    /// Cache `doc` unless an eviction happened since generation `seen`.
    fn insert_if_current(&self, rel: &Path, doc: Arc<Value>, seen: u64) -> bool {
        let mut entries = self.write();
        if self.generation() != seen {
            return false;
        }
        entries.insert(rel.to_path_buf(), doc);
        true
    }

    /// Resolve `rel` to a canonical absolute path that is inside the root.
    fn contain(&self, rel: &Path) -> Result<PathBuf, FixtureError> {
        let joined = self.root.join(rel);
        let abs = joined.canonicalize().map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => FixtureError::NotFound(rel.to_path_buf()),
            _ => FixtureError::Io {
                path: rel.to_path_buf(),
                source,
            },
        })?;
        if !abs.starts_with(&self.root) {
            return Err(FixtureError::OutsideRoot);
        }
        Ok(abs)
    }

    // A panic while holding the lock cannot leave the map half-updated,
    // so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, Arc<Value>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, Arc<Value>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FixtureStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.json"), r#"{"status":"ok"}"#).unwrap();
        std::fs::create_dir(dir.path().join("user")).unwrap();
        std::fs::write(dir.path().join("user/user_1.json"), r#"{"id":1}"#).unwrap();
        let store = FixtureStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_load_and_cache() {
        let (_dir, store) = setup();
        assert!(store.is_empty());

        let doc = store.load(Path::new("user/user_1.json")).unwrap();
        assert_eq!(*doc, json!({"id": 1}));
        assert_eq!(store.len(), 1);

        let again = store.load(Path::new("user/user_1.json")).unwrap();
        assert!(Arc::ptr_eq(&doc, &again));
    }

    #[test]
    fn test_cached_value_survives_disk_change_until_invalidated() {
        let (dir, store) = setup();
        let rel = Path::new("default.json");
        assert_eq!(*store.load(rel).unwrap(), json!({"status": "ok"}));

        std::fs::write(dir.path().join("default.json"), r#"{"status":"changed"}"#).unwrap();
        assert_eq!(*store.load(rel).unwrap(), json!({"status": "ok"}));

        assert!(store.invalidate(rel));
        assert_eq!(*store.load(rel).unwrap(), json!({"status": "changed"}));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let (_dir, store) = setup();
        let err = store.try_load(Path::new("user/user_2.json")).unwrap_err();
        assert!(matches!(err, FixtureError::NotFound(_)));
        assert!(store.load(Path::new("user/user_2.json")).is_none());
    }

    #[test]
    fn test_malformed_json_is_parse_error_and_not_cached() {
        let (dir, store) = setup();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let err = store.try_load(Path::new("broken.json")).unwrap_err();
        assert!(matches!(err, FixtureError::Parse { .. }));
        assert!(store.load(Path::new("broken.json")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_traversal_rejected() {
        let (dir, store) = setup();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.json"), "{}").unwrap();
        let sibling = outside.path().file_name().unwrap();
        assert_eq!(dir.path().parent(), outside.path().parent());

        let rel = Path::new("..").join(sibling).join("secret.json");
        let err = store.try_load(&rel).unwrap_err();
        assert!(matches!(err, FixtureError::OutsideRoot));
        assert!(store.load(&rel).is_none());

        let abs = outside.path().join("secret.json");
        let err = store.try_load(&abs).unwrap_err();
        assert!(matches!(err, FixtureError::OutsideRoot));
        assert!(store.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let (dir, store) = setup();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.json"), r#"{"secret":true}"#).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.json"),
            dir.path().join("link.json"),
        )
        .unwrap();

        let err = store.try_load(Path::new("link.json")).unwrap_err();
        assert!(matches!(err, FixtureError::OutsideRoot));
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let (_dir, store) = setup();
        assert!(!store.invalidate(Path::new("never/cached.json")));
        store.load(Path::new("default.json")).unwrap();
        assert!(store.invalidate(Path::new("default.json")));
        assert!(!store.invalidate(Path::new("default.json")));
    }

    #[test]
    fn test_invalidate_tree() {
        let (dir, store) = setup();
        std::fs::write(dir.path().join("user/default.json"), "{}").unwrap();
        store.load(Path::new("user/user_1.json")).unwrap();
        store.load(Path::new("user/default.json")).unwrap();
        store.load(Path::new("default.json")).unwrap();

        assert_eq!(store.invalidate_tree(Path::new("user")), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_read_overtaken_by_eviction_is_not_cached() {
        let (dir, store) = setup();
        let rel = Path::new("default.json");

        let seen = store.generation();
        let stale = Arc::new(store.read_from_disk(rel).unwrap());
        std::fs::write(dir.path().join("default.json"), r#"{"status":"changed"}"#).unwrap();
        assert!(!store.invalidate(rel));

        assert!(!store.insert_if_current(rel, stale, seen));
        assert!(store.is_empty());
        assert_eq!(*store.load(rel).unwrap(), json!({"status": "changed"}));
    }

    #[test]
    fn test_tree_eviction_and_clear_also_reject_stale_reads() {
        let (_dir, store) = setup();
        let rel = Path::new("user/user_1.json");

        let seen = store.generation();
        let doc = Arc::new(store.read_from_disk(rel).unwrap());
        store.invalidate_tree(Path::new("user"));
        assert!(!store.insert_if_current(rel, Arc::clone(&doc), seen));

        let seen = store.generation();
        store.clear();
        assert!(!store.insert_if_current(rel, Arc::clone(&doc), seen));

        let seen = store.generation();
        assert!(store.insert_if_current(rel, doc, seen));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_exists_and_is_dir() {
        let (_dir, store) = setup();
        assert!(store.exists(Path::new("user/user_1.json")));
        assert!(!store.exists(Path::new("user")));
        assert!(store.is_dir(Path::new("user")));
        assert!(!store.is_dir(Path::new("order")));
    }
}
