//! Key-value stores the guard inspects: the long-lived persistent store and the
//! tab-scoped session store. The host supplies real backends; an in-memory map and
//! a JSON-file store are provided for native clients and tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;

pub trait KeyValueStore: Send + Sync {
    fn keys(&self) -> Result<Vec<String>>;
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { entries: RwLock::new(map) }
    }

    pub fn len(&self) -> usize { self.entries.read().len() }

    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }

    pub fn contains(&self, key: &str) -> bool { self.entries.read().contains_key(key) }
}

impl KeyValueStore for MemoryStore {
    fn keys(&self) -> Result<Vec<String>> { Ok(self.entries.read().keys().cloned().collect()) }

    fn get(&self, key: &str) -> Result<Option<String>> { Ok(self.entries.read().get(key).cloned()) }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Persistent store backed by a single JSON object file. Every write rewrites the file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading store file {}", path.display()))?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text).with_context(|| format!("parsing store file {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries: RwLock::new(entries) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let text = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, text).with_context(|| format!("writing store file {}", self.path.display()))
    }
}

impl KeyValueStore for JsonFileStore {
    fn keys(&self) -> Result<Vec<String>> { Ok(self.entries.read().keys().cloned().collect()) }

    fn get(&self, key: &str) -> Result<Option<String>> { Ok(self.entries.read().get(key).cloned()) }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.entries.write();
        map.insert(key.to_string(), value.to_string());
        self.flush(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.entries.write();
        if map.remove(key).is_some() {
            self.flush(&map)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_persists_across_reopen() -> Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("state").join("local.json");
        {
            let store = JsonFileStore::open(&path)?;
            store.set("msal.account.keys", "[\"a\"]")?;
            store.set("portal.theme", "dark")?;
            store.remove("portal.theme")?;
        }
        let reopened = JsonFileStore::open(&path)?;
        assert_eq!(reopened.keys()?, vec!["msal.account.keys".to_string()]);
        assert_eq!(reopened.get("msal.account.keys")?.as_deref(), Some("[\"a\"]"));
        Ok(())
    }

    #[test]
    fn file_store_rejects_unreadable_file() -> Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("local.json");
        std::fs::write(&path, "{not json")?;
        assert!(JsonFileStore::open(&path).is_err());
        Ok(())
    }

    #[test]
    fn memory_store_basic_ops() -> Result<()> {
        let store = MemoryStore::with_entries([("a", "1")]);
        store.set("b", "2")?;
        store.remove("a")?;
        assert!(!store.contains("a"));
        assert_eq!(store.get("b")?.as_deref(), Some("2"));
        assert_eq!(store.len(), 1);
        Ok(())
    }
}
