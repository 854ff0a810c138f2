//! Key-value store backing the account shim.
//!
//! Mirrors what a browser's local storage offers: string keys, string values,
//! read/write/remove. Two implementations:
//!   - `MemoryStore`: process-local, used when STORE_PATH is unset and in tests
//!   - `FileStore`: one JSON object on disk, rewritten on every mutation

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  sync::Mutex,
};

use tracing::{debug, instrument};

use crate::error::StoreError;

pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
  fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
  fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
    // A poisoned map is still a consistent map: every write is a single insert/remove.
    self.entries.lock().unwrap_or_else(|p| p.into_inner())
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    Ok(self.entries().get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    self.entries().insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StoreError> {
    self.entries().remove(key);
    Ok(())
  }
}

/// JSON file store. The whole file is read on every access so that several
/// processes (or a hand edit) never leave us with a stale view.
pub struct FileStore {
  path: PathBuf,
  write_lock: Mutex<()>,
}

impl FileStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), write_lock: Mutex::new(()) }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
    match std::fs::read_to_string(&self.path) {
      Ok(s) if s.trim().is_empty() => Ok(BTreeMap::new()),
      Ok(s) => Ok(serde_json::from_str(&s)?),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
      Err(e) => Err(e.into()),
    }
  }

  fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
    if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
      std::fs::create_dir_all(dir)?;
    }
    // Readers only ever see a complete file.
    let tmp = self.path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
    std::fs::rename(&tmp, &self.path)?;
    Ok(())
  }

  fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StoreError> {
    let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
    let mut entries = self.load()?;
    f(&mut entries);
    self.save(&entries)
  }
}

impl KeyValueStore for FileStore {
  fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    Ok(self.load()?.remove(key))
  }

  #[instrument(level = "debug", skip(self, value), fields(path = %self.path.display(), value_len = value.len()))]
  fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
    self.mutate(|m| {
      m.insert(key.to_string(), value.to_string());
    })?;
    debug!(target: "store", %key, "Stored value");
    Ok(())
  }

  #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
  fn remove(&self, key: &str) -> Result<(), StoreError> {
    self.mutate(|m| {
      m.remove(key);
    })
  }
}
