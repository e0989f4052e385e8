// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-file backed store with atomic writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{CookieJar, SessionStorage, StorageError};

/// A string map persisted to a single JSON file.
///
/// Implements both [`SessionStorage`] and [`CookieJar`]; use one file per
/// role so the two lifetimes stay separate.
pub struct FileStorage {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty store. An unparsable file is logged and
    /// treated as empty; the next write replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), "discarding unreadable store: {e}");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no existing store");
                BTreeMap::new()
            }
            Err(source) => return Err(StorageError::Io { path: display(&path), source }),
        };
        Ok(Self { path, values: Mutex::new(values) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        if f(&mut values) {
            write_atomic(&self.path, &values)?;
        }
        Ok(())
    }
}

/// Write tmp + rename. The temp name is unique per process and call so
/// concurrent writers never share a partially written file.
fn write_atomic(path: &Path, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(values)
        .map_err(|source| StorageError::Encode { path: display(path), source })?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|source| StorageError::Io { path: display(parent), source })?;
        }
    }
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)
        .map_err(|source| StorageError::Io { path: display(&tmp_path), source })?;
    std::fs::rename(&tmp_path, path)
        .map_err(|source| StorageError::Io { path: display(path), source })?;
    Ok(())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|m| m.insert(key.to_owned(), value.to_owned()).as_deref() != Some(value))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|m| m.remove(key).is_some())
    }
}

impl CookieJar for FileStorage {
    fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        SessionStorage::get(self, name)
    }

    fn set(&self, name: &str, value: &str) -> Result<(), StorageError> {
        SessionStorage::set(self, name, value)
    }

    fn delete(&self, name: &str) -> Result<(), StorageError> {
        SessionStorage::remove(self, name)
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
