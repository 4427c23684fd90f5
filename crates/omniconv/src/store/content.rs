//! Content-addressed storage for uploaded input files.
//!
//! Bytes are keyed by their SHA-256 digest: identical uploads share one
//! backing file regardless of how many jobs reference them. Writes go to
//! a `.tmp` sibling first and are renamed into place, so a crash or a
//! racing `put` never leaves a partial entry under a final name.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Aggregate usage numbers for the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub total_refs: u64,
}

#[derive(Debug)]
struct Entry {
    path: PathBuf,
    size: u64,
    ref_count: u64,
}

pub struct ContentStore {
    root: PathBuf,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ContentStore {
    /// Opens the store rooted at `root`, creating the directory if needed
    /// and re-registering any files from a previous run at `ref_count = 0`.
    /// Callers that restore jobs re-acquire their references afterwards.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::Io {
            path: root.clone(),
            source: e,
        })?;

        let mut entries = HashMap::new();
        for entry in walkdir::WalkDir::new(&root)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let name = entry.file_name().to_string_lossy().to_string();
            // Leftover temp files from an interrupted put are garbage.
            if name.ends_with(".tmp") {
                let _ = std::fs::remove_file(entry.path());
                continue;
            }
            if !is_hex_digest(&name) {
                log::warn!("Ignoring foreign file in content store: {}", name);
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            entries.insert(
                name,
                Entry {
                    path: entry.path().to_path_buf(),
                    size,
                    ref_count: 0,
                },
            );
        }

        log::info!(
            "Content store opened at {} ({} entries)",
            root.display(),
            entries.len()
        );

        Ok(Self {
            root,
            entries: RwLock::new(entries),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registers content, deduplicating against existing entries. Returns
    /// the digest either way; new entries start unreferenced.
    pub fn put(&self, bytes: &[u8]) -> Result<String, StoreError> {
        let hash = hex::encode(Sha256::digest(bytes));

        if self.read_entries().contains_key(&hash) {
            log::debug!("Content {} already stored, reusing entry", &hash[..12]);
            return Ok(hash);
        }

        let mut entries = self.write_entries();
        // Re-check under the write lock; a concurrent put may have won.
        if entries.contains_key(&hash) {
            return Ok(hash);
        }

        let final_path = self.root.join(&hash);
        let tmp_path = self.root.join(format!("{hash}.tmp"));

        std::fs::write(&tmp_path, bytes).map_err(|e| StoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        if let Err(e) = std::fs::rename(&tmp_path, &final_path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StoreError::Io {
                path: final_path,
                source: e,
            });
        }

        entries.insert(
            hash.clone(),
            Entry {
                path: final_path,
                size: bytes.len() as u64,
                ref_count: 0,
            },
        );

        Ok(hash)
    }

    /// Increments the entry's reference count and returns its path.
    pub fn acquire(&self, hash: &str) -> Result<PathBuf, StoreError> {
        let mut entries = self.write_entries();
        let entry = entries
            .get_mut(hash)
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))?;
        entry.ref_count += 1;
        Ok(entry.path.clone())
    }

    /// Decrements the entry's reference count. A zero-referenced entry
    /// becomes eligible for the next cleanup sweep; it is not deleted
    /// here. Over-release is a caller bug and is logged, not counted.
    pub fn release(&self, hash: &str) {
        let mut entries = self.write_entries();
        match entries.get_mut(hash) {
            Some(entry) if entry.ref_count > 0 => entry.ref_count -= 1,
            Some(_) => log::warn!("release() on already unreferenced entry {}", hash),
            None => log::warn!("release() on unknown hash {}", hash),
        }
    }

    /// The backing path without touching the reference count.
    pub fn path_of(&self, hash: &str) -> Result<PathBuf, StoreError> {
        self.read_entries()
            .get(hash)
            .map(|e| e.path.clone())
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.read_entries().contains_key(hash)
    }

    pub fn ref_count(&self, hash: &str) -> Option<u64> {
        self.read_entries().get(hash).map(|e| e.ref_count)
    }

    pub fn stats(&self) -> StoreStats {
        let entries = self.read_entries();
        StoreStats {
            entry_count: entries.len(),
            total_bytes: entries.values().map(|e| e.size).sum(),
            total_refs: entries.values().map(|e| e.ref_count).sum(),
        }
    }

    /// Snapshot of entries currently at zero references.
    pub(crate) fn zero_ref_hashes(&self) -> Vec<String> {
        self.read_entries()
            .iter()
            .filter(|(_, e)| e.ref_count == 0)
            .map(|(h, _)| h.clone())
            .collect()
    }

    /// Removes the entry and its backing bytes if it is still at zero
    /// references and not named by `in_use`. Both checks run under the
    /// write lock, so an acquire racing the sweep keeps its entry.
    /// Returns the reclaimed byte count when something was removed.
    pub(crate) fn remove_if_unreferenced(
        &self,
        hash: &str,
        in_use: &HashSet<String>,
    ) -> Result<Option<u64>, StoreError> {
        let mut entries = self.write_entries();
        let eligible = match entries.get(hash) {
            Some(entry) => entry.ref_count == 0 && !in_use.contains(hash),
            None => false,
        };
        if !eligible {
            return Ok(None);
        }

        let entry = entries.remove(hash).expect("checked above");
        match std::fs::remove_file(&entry.path) {
            Ok(()) => Ok(Some(entry.size)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Some(entry.size)),
            Err(e) => {
                // Keep the record so a later sweep retries the delete.
                entries.insert(
                    hash.to_string(),
                    Entry {
                        path: entry.path.clone(),
                        size: entry.size,
                        ref_count: 0,
                    },
                );
                Err(StoreError::Io {
                    path: entry.path,
                    source: e,
                })
            }
        }
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Entry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Content store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Content store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn is_hex_digest(name: &str) -> bool {
    name.len() == 64 && name.chars().all(|c| c.is_ascii_hexdigit())
}
