//! Duplicate ledger: the set of item identifiers already reposted
//!
//! The ledger is loaded once at startup, held in memory, and written back in
//! full after every addition. Persistence goes through [`LedgerStore`] so
//! tests can swap the JSON file for an in-memory store.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{LedgerError, Result};

/// Backing storage for the ledger's complete identifier set
pub trait LedgerStore: Send + Sync {
    /// Read the persisted identifiers, `None` when nothing was ever saved
    fn load(&self) -> Result<Option<Vec<String>>>;

    /// Replace the persisted identifiers with `ids`
    fn save(&self, ids: &[String]) -> Result<()>;
}

/// Identifiers were historically written both as JSON strings and numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredId {
    Text(String),
    Number(u64),
}

impl From<StoredId> for String {
    fn from(id: StoredId) -> Self {
        match id {
            StoredId::Text(s) => s,
            StoredId::Number(n) => n.to_string(),
        }
    }
}

/// Ledger persisted as a JSON array of identifier strings
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<String>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        if content.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }

        let ids: Vec<StoredId> =
            serde_json::from_str(&content).map_err(|source| LedgerError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        Ok(Some(ids.into_iter().map(String::from).collect()))
    }

    /// Writes to a sibling temp file and renames it over the ledger so a
    /// crash mid-write never leaves a truncated file behind
    fn save(&self, ids: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let content = serde_json::to_string(ids).map_err(LedgerError::Serialize)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// In-memory store; clones share the same saved state
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    saved: Arc<Mutex<Option<Vec<String>>>>,
    save_count: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated as if `ids` had been saved before
    pub fn with_ids(ids: &[&str]) -> Self {
        let store = Self::default();
        *store.saved.lock().unwrap() = Some(ids.iter().map(|s| s.to_string()).collect());
        store
    }

    /// Identifiers from the most recent save
    pub fn saved(&self) -> Option<Vec<String>> {
        self.saved.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.save_count.lock().unwrap()
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<String>>> {
        Ok(self.saved.lock().unwrap().clone())
    }

    fn save(&self, ids: &[String]) -> Result<()> {
        *self.saved.lock().unwrap() = Some(ids.to_vec());
        *self.save_count.lock().unwrap() += 1;
        Ok(())
    }
}

/// Set of identifiers that have been successfully reposted
pub struct DuplicateLedger {
    store: Box<dyn LedgerStore>,
    ids: BTreeSet<String>,
}

impl DuplicateLedger {
    /// Load the ledger from `store`; an absent store yields an empty ledger
    pub fn load(store: impl LedgerStore + 'static) -> Result<Self> {
        let mut ledger = Self {
            store: Box::new(store),
            ids: BTreeSet::new(),
        };
        ledger.reload()?;
        Ok(ledger)
    }

    /// Replace the in-memory set with the persisted one
    pub fn reload(&mut self) -> Result<()> {
        self.ids = self
            .store
            .load()?
            .unwrap_or_default()
            .iter()
            .map(|id| normalize_id(id))
            .filter(|id| !id.is_empty())
            .collect();
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(&normalize_id(id))
    }

    /// Record `id` and persist the full set before returning
    ///
    /// Returns `false` (without writing) when the id was already present.
    /// The id stays recorded in memory even if persisting fails, so the
    /// running process never reposts it.
    pub fn add(&mut self, id: &str) -> Result<bool> {
        if !self.ids.insert(normalize_id(id)) {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    /// Write the complete set to the store
    pub fn flush(&self) -> Result<()> {
        let ids: Vec<String> = self.ids.iter().cloned().collect();
        self.store.save(&ids)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Canonical string form of a remote identifier
pub fn normalize_id(id: &str) -> String {
    id.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepostError;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("reposted_ids.json"));

        let ledger = DuplicateLedger::load(store).unwrap();
        assert!(ledger.is_empty());
        assert!(!temp_dir.path().join("reposted_ids.json").exists());
    }

    #[test]
    fn test_add_persists_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("reposted_ids.json");

        let mut ledger = DuplicateLedger::load(JsonFileStore::new(&path)).unwrap();
        assert!(ledger.add("100").unwrap());
        assert!(ledger.contains("100"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, r#"["100"]"#);
    }

    #[test]
    fn test_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reposted_ids.json");

        {
            let mut ledger = DuplicateLedger::load(JsonFileStore::new(&path)).unwrap();
            ledger.add("100").unwrap();
            ledger.add("200").unwrap();
        }

        let ledger = DuplicateLedger::load(JsonFileStore::new(&path)).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("100"));
        assert!(ledger.contains("200"));
        assert!(!ledger.contains("300"));
    }

    #[test]
    fn test_ids_are_normalized() {
        let mut ledger = DuplicateLedger::load(MemoryStore::new()).unwrap();
        ledger.add(" 100\n").unwrap();

        assert!(ledger.contains("100"));
        assert!(ledger.contains("  100"));
        assert!(!ledger.add("100").unwrap());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_duplicate_add_does_not_write() {
        let store = MemoryStore::new();
        let mut ledger = DuplicateLedger::load(store.clone()).unwrap();

        ledger.add("100").unwrap();
        ledger.add("100").unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.saved(), Some(vec!["100".to_string()]));
    }

    #[test]
    fn test_reads_numeric_ids() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reposted_ids.json");
        std::fs::write(&path, r#"[3141592653589793, "42"]"#).unwrap();

        let ledger = DuplicateLedger::load(JsonFileStore::new(&path)).unwrap();
        assert!(ledger.contains("3141592653589793"));
        assert!(ledger.contains("42"));
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reposted_ids.json");
        std::fs::write(&path, "{not json").unwrap();

        match DuplicateLedger::load(JsonFileStore::new(&path)) {
            Err(RepostError::Ledger(LedgerError::Corrupt { .. })) => {}
            Err(other) => panic!("Expected Corrupt, got {:?}", other),
            Ok(_) => panic!("Expected Corrupt, got a ledger"),
        }
    }

    #[test]
    fn test_reload_is_idempotent() {
        let store = MemoryStore::with_ids(&["1", "2"]);
        let mut ledger = DuplicateLedger::load(store).unwrap();

        ledger.reload().unwrap();
        ledger.reload().unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reposted_ids.json");

        let mut ledger = DuplicateLedger::load(JsonFileStore::new(&path)).unwrap();
        ledger.add("100").unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
