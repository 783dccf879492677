//! Byte-store abstraction the serving layer reads objects from.
//!
//! The edge gate is agnostic to the concrete storage technology; it only
//! needs `get(path) -> bytes | absent`. Two backends are provided:
//! [`FsStore`] for serving a deployed directory tree, and [`MemoryStore`]
//! as a test double.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Errors from object-store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend failed to read or write an object.
    #[error("store I/O failure at {path}: {source}")]
    Io {
        /// The object path that failed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The requested path is not a valid object key (absolute, empty, or
    /// contains traversal segments).
    #[error("invalid object path: {path}")]
    InvalidPath {
        /// The rejected path.
        path: String,
    },
}

/// Key-value object store: canonical relative path to byte content.
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] for malformed keys and
    /// [`StoreError::Io`] for backend failures other than absence.
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store an object's bytes under a path, creating parents as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] or [`StoreError::Io`].
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Validate an object key: relative, `/`-separated, no `.`/`..` segments.
fn validate_key(path: &str) -> Result<(), StoreError> {
    let invalid = || StoreError::InvalidPath {
        path: path.to_string(),
    };
    if path.is_empty() || path.starts_with('/') {
        return Err(invalid());
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid());
        }
    }
    Ok(())
}

/// In-memory object store for tests.
///
/// Clones share the same underlying storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (indicates a thread panic).
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no objects.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (indicates a thread panic).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Remove an object, if present.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (indicates a thread panic).
    pub fn remove(&self, path: &str) {
        self.objects.write().expect("lock poisoned").remove(path);
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            objects: Arc::clone(&self.objects),
        }
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(path)?;
        Ok(self.objects.read().expect("lock poisoned").get(path).cloned())
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        validate_key(path)?;
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Filesystem-backed object store rooted at a directory.
///
/// Keys resolve strictly under the root; traversal segments are rejected
/// before any filesystem access.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store serving objects under `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The directory this store reads from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        validate_key(path)?;
        let joined = self.root.join(path);
        // validate_key already rejects traversal; this guards against
        // platform-specific component parsing surprises.
        if joined
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(joined)
    }
}

impl ObjectStore for FsStore {
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let resolved = self.resolve(path)?;
        match std::fs::read(&resolved) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let resolved = self.resolve(path)?;
        let io_err = |source| StoreError::Io {
            path: path.to_string(),
            source,
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&resolved, bytes).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.put("index.html", b"<html/>").unwrap();
        assert_eq!(store.get("index.html").unwrap().unwrap(), b"<html/>");
        assert!(store.get("missing.html").unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_store_clone_shares_objects() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.put("x", b"1").unwrap();
        assert_eq!(b.get("x").unwrap().unwrap(), b"1");
    }

    #[test]
    fn traversal_keys_are_rejected() {
        let store = MemoryStore::new();
        for bad in ["../etc/passwd", "/etc/passwd", "a//b", "a/./b", "", "a/.."] {
            assert!(
                matches!(store.get(bad), Err(StoreError::InvalidPath { .. })),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn fs_store_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FsStore::new(dir.path().to_path_buf());
        store.put("posts/a.html", b"a").unwrap();
        assert_eq!(store.get("posts/a.html").unwrap().unwrap(), b"a");
        assert!(store.get("posts/b.html").unwrap().is_none());
        assert!(dir.path().join("posts/a.html").is_file());
    }

    #[test]
    fn fs_store_rejects_escape() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FsStore::new(dir.path().to_path_buf());
        assert!(matches!(
            store.get("../outside"),
            Err(StoreError::InvalidPath { .. })
        ));
    }
}
