//! Compute-once caches shared by concurrent shading runs.
//!
//! Parallel builds of several projects ask for the same lock file, the same friend grant or the
//! same signing key at the same time. [`OnceMap`] guarantees that each key is computed at most
//! once: the first caller runs the computation, concurrent callers for the same key block until
//! it finishes and share the result. Failed computations are not cached.

use std::{
    fmt,
    hash::Hash,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use dashmap::DashMap;

use crate::{
    assets::{normalize_path, AssetsFile, GraphLoader},
    metadata::identity::{AssemblyIdentity, FriendGrant},
    strongname::StrongNameKey,
    Error, Result,
};

type Cell<V> = Arc<OnceLock<std::result::Result<Arc<V>, String>>>;

/// A concurrent map whose values are computed at most once per key.
pub struct OnceMap<K, V> {
    entries: DashMap<K, Cell<V>>,
}

impl<K: Eq + Hash + Clone, V> OnceMap<K, V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        OnceMap {
            entries: DashMap::new(),
        }
    }

    /// Return the value of `key`, computing it with `init` if no caller did so before.
    ///
    /// The shard lock is released before `init` runs, so computations for other keys proceed in
    /// parallel.
    ///
    /// # Errors
    /// The caller that ran `init` receives its error. Callers that waited on the failed
    /// computation receive [`Error::Cache`] with the same message. The entry is removed, so a
    /// later call computes again.
    pub fn get_or_try_init<F>(&self, key: K, init: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        let cell = Arc::clone(self.entries.entry(key.clone()).or_default().value());

        let mut own_error = None;
        let outcome = cell.get_or_init(|| match init() {
            Ok(value) => Ok(Arc::new(value)),
            Err(error) => {
                let message = error.to_string();
                own_error = Some(error);
                Err(message)
            }
        });

        match outcome {
            Ok(value) => Ok(Arc::clone(value)),
            Err(message) => {
                self.entries
                    .remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
                Err(own_error.unwrap_or_else(|| Error::Cache(message.clone())))
            }
        }
    }

    /// The value of `key`, if it was computed successfully.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries
            .get(key)
            .and_then(|cell| cell.get().and_then(|outcome| outcome.as_ref().ok().cloned()))
    }

    /// Number of cached or in-flight entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<K: Eq + Hash + Clone, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> fmt::Debug for OnceMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnceMap")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// The cache service passed into shading runs.
///
/// Holds the loaded and closed lock files by path, the friend grant of each assembly identity,
/// and signing keys by key file (`None` for the key generated for this process).
#[derive(Debug, Default)]
pub struct ShadingCache {
    assets: OnceMap<PathBuf, AssetsFile>,
    grants: OnceMap<AssemblyIdentity, FriendGrant>,
    keys: OnceMap<Option<PathBuf>, StrongNameKey>,
}

impl ShadingCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock file at `path`, loaded with `loader` on first use.
    ///
    /// # Errors
    /// Returns the loader's error; nothing is cached in that case.
    pub fn assets(&self, path: &Path, loader: &dyn GraphLoader) -> Result<Arc<AssetsFile>> {
        let path = normalize_path(path);
        self.assets
            .get_or_try_init(path.clone(), || loader.load(&path))
    }

    /// The friend grant naming `identity`, computed with `init` on first use.
    ///
    /// # Errors
    /// Returns the error of `init`.
    pub fn grant<F>(&self, identity: &AssemblyIdentity, init: F) -> Result<Arc<FriendGrant>>
    where
        F: FnOnce() -> Result<FriendGrant>,
    {
        self.grants.get_or_try_init(identity.clone(), init)
    }

    /// The signing key loaded from `path`, or the key generated for this cache when `path` is
    /// `None`.
    ///
    /// # Errors
    /// Returns [`Error::KeyMaterial`] or an I/O error if the key can not be loaded or generated.
    pub fn key(&self, path: Option<&Path>, password: Option<&str>) -> Result<Arc<StrongNameKey>> {
        let key = path.map(normalize_path);
        self.keys.get_or_try_init(key, || match path {
            Some(path) => StrongNameKey::load(path, password),
            None => StrongNameKey::generate(),
        })
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.assets.clear();
        self.grants.clear();
        self.keys.clear();
    }
}
