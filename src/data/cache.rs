//! Table Cache Module
//! Read-through cache of loaded tables keyed by path and content digest,
//! plus a bounded memo for views derived from them.

use crate::data::loader::{read_source, DataLoader, LoadOptions, LoaderError};
use log::info;
use lru::LruCache;
use polars::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// A loaded table together with the digest of the bytes it came from.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub digest: String,
    pub table: DataFrame,
}

struct CachedTable {
    digest: String,
    options: LoadOptions,
    table: DataFrame,
}

/// SHA-256 of a file's contents, hex encoded.
pub fn content_digest(path: &Path) -> Result<String, LoaderError> {
    Ok(digest_bytes(&read_source(path)?))
}

fn digest_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Shares loaded tables between renders.
///
/// Callers receive their own `DataFrame` handle; cached tables are never
/// modified in place. An entry is reused only while the file content and
/// the load options are unchanged. The digest and the table always come
/// from the same read of the file.
#[derive(Default)]
pub struct TableCache {
    entries: Mutex<HashMap<PathBuf, CachedTable>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(
        &self,
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<LoadedTable, LoaderError> {
        let path = path.as_ref();
        let bytes = read_source(path)?;
        let digest = digest_bytes(&bytes);

        {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = entries.get(path) {
                if cached.digest == digest && &cached.options == options {
                    info!("Table cache hit for {}", path.display());
                    return Ok(LoadedTable {
                        digest,
                        table: cached.table.clone(),
                    });
                }
            }
        }

        info!("Table cache miss for {}", path.display());
        let table = DataLoader::new(options.clone()).parse(path, bytes)?;

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            path.to_path_buf(),
            CachedTable {
                digest: digest.clone(),
                options: options.clone(),
                table: table.clone(),
            },
        );

        Ok(LoadedTable { digest, table })
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Default number of memoized views.
pub const DEFAULT_MEMO_CAPACITY: usize = 64;

/// Memo of derived views keyed by (content digest, selection key).
///
/// Least recently used entries are evicted once `capacity` is reached.
pub struct ViewMemo<V> {
    state: Mutex<LruCache<(String, String), V>>,
}

impl<V: Clone> Default for ViewMemo<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MEMO_CAPACITY)
    }
}

impl<V: Clone> ViewMemo<V> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the memoized view or compute, store and return it.
    ///
    /// Errors are returned as-is and never memoized.
    pub fn get_or_compute<E, F>(&self, digest: &str, selection_key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let key = (digest.to_string(), selection_key.to_string());

        if let Some(view) = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(view.clone());
        }

        let view = compute()?;
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, view.clone());

        Ok(view)
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
