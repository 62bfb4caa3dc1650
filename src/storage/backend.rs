//! Key-value backends for engine snapshots.
//!
//! Both backends keep entries in an ordered map so prefix scans return keys
//! in a stable order. [`FileStore`] writes the map as one JSON snapshot file
//! on flush, through a temporary file that is renamed into place.
//!
//! [`TypedStore`] layers bincode encoding on top of either backend.

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Raw entry map shared by the backends
type Entries = BTreeMap<Vec<u8>, Vec<u8>>;

// ═══════════════════════════════════════════════════════════════════════════════
// STORAGE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// A byte-keyed store
pub trait StorageBackend: Send + Sync {
    /// Value stored under `key`
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`; returns whether it was present
    fn delete(&self, key: &[u8]) -> Result<bool>;

    /// Keys starting with `prefix`, in ascending order
    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Remove every entry
    fn clear(&self) -> Result<()>;

    /// Make pending writes durable
    fn flush(&self) -> Result<()>;
}

fn poisoned<E: std::fmt::Display>(e: E) -> Error {
    Error::Storage(format!("store lock poisoned: {}", e))
}

fn scan(entries: &Entries, prefix: &[u8]) -> Vec<Vec<u8>> {
    entries
        .range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Ephemeral store for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<Entries>,
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for InMemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        Ok(self.entries.write().map_err(poisoned)?.remove(key).is_some())
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(scan(&entries, prefix))
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot file format version
pub const SNAPSHOT_VERSION: u32 = 1;

const SNAPSHOT_FILE: &str = "snapshot.json";

/// On-disk layout: UTF-8 keys, hex values
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    written_at: String,
    entries: BTreeMap<String, String>,
}

/// Directory-backed store holding a single snapshot file
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    entries: RwLock<Entries>,
    dirty: RwLock<bool>,
}

impl FileStore {
    /// Open the store in `dir`, creating the directory and loading any snapshot
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Storage(format!("cannot create {}: {}", dir.display(), e))
        })?;
        let entries = Self::read_snapshot(&dir.join(SNAPSHOT_FILE))?;
        Ok(Self {
            dir,
            entries: RwLock::new(entries),
            dirty: RwLock::new(false),
        })
    }

    /// Path of the snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    fn read_snapshot(path: &Path) -> Result<Entries> {
        if !path.exists() {
            return Ok(Entries::new());
        }
        let file = File::open(path)
            .map_err(|e| Error::Storage(format!("cannot open {}: {}", path.display(), e)))?;
        let snapshot: SnapshotFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Storage(format!("corrupt snapshot {}: {}", path.display(), e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Storage(format!(
                "snapshot version {} is not supported (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let mut entries = Entries::new();
        for (key, value) in snapshot.entries {
            let value = hex::decode(&value)
                .map_err(|e| Error::Storage(format!("bad value under {}: {}", key, e)))?;
            entries.insert(key.into_bytes(), value);
        }
        debug!(path = %path.display(), entries = entries.len(), "Snapshot read");
        Ok(entries)
    }

    fn write_snapshot(&self) -> Result<()> {
        let entries = self.entries.read().map_err(poisoned)?;
        let mut encoded = BTreeMap::new();
        for (key, value) in entries.iter() {
            let key = String::from_utf8(key.clone())
                .map_err(|_| Error::Storage(format!("key {} is not UTF-8", hex::encode(key))))?;
            encoded.insert(key, hex::encode(value));
        }
        let snapshot = SnapshotFile {
            version: SNAPSHOT_VERSION,
            written_at: Utc::now().to_rfc3339(),
            entries: encoded,
        };

        let path = self.snapshot_path();
        let tmp = self.dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        let file = File::create(&tmp)
            .map_err(|e| Error::Storage(format!("cannot create {}: {}", tmp.display(), e)))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &snapshot)
            .map_err(|e| Error::Storage(format!("cannot encode snapshot: {}", e)))?;
        writer
            .flush()
            .map_err(|e| Error::Storage(format!("cannot write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| Error::Storage(format!("cannot replace {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), entries = entries.len(), "Snapshot written");
        Ok(())
    }

    fn mark_dirty(&self) -> Result<()> {
        *self.dirty.write().map_err(poisoned)? = true;
        Ok(())
    }
}

impl StorageBackend for FileStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_vec(), value.to_vec());
        self.mark_dirty()
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        let removed = self.entries.write().map_err(poisoned)?.remove(key).is_some();
        if removed {
            self.mark_dirty()?;
        }
        Ok(removed)
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(scan(&entries, prefix))
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().map_err(poisoned)?.clear();
        self.mark_dirty()
    }

    fn flush(&self) -> Result<()> {
        if !*self.dirty.read().map_err(poisoned)? {
            return Ok(());
        }
        self.write_snapshot()?;
        *self.dirty.write().map_err(poisoned)? = false;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPED STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Bincode-encoded values over a byte store
pub struct TypedStore<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> TypedStore<B> {
    /// Wrap `backend`
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Decode the value under `key`
    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        self.backend
            .get(key)?
            .map(|bytes| {
                bincode::deserialize(&bytes).map_err(|e| {
                    Error::Deserialization(format!("{}: {}", String::from_utf8_lossy(key), e))
                })
            })
            .transpose()
    }

    /// Encode `value` under `key`
    pub fn set<T: Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value).map_err(|e| {
            Error::Serialization(format!("{}: {}", String::from_utf8_lossy(key), e))
        })?;
        self.backend.set(key, &bytes)
    }

    /// Remove `key`
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.backend.delete(key)
    }

    /// Keys under `prefix`
    pub fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.backend.list_prefix(prefix)
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<()> {
        self.backend.clear()
    }

    /// Make pending writes durable
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }

    /// Underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEYS
// ═══════════════════════════════════════════════════════════════════════════════

/// Key prefixes
pub mod prefixes {
    /// One entry per position, keyed by id
    pub const POSITION: &[u8] = b"pos:";
    /// Engine state without the positions
    pub const STATE: &[u8] = b"state:";
}

/// Key of the engine state entry
pub const ENGINE_STATE_KEY: &[u8] = b"state:engine";

/// `prefix` followed by `key`
pub fn make_key(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    [prefix, key].concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_roundtrip_and_delete() {
        let store = InMemoryStore::new();
        store.set(b"pos:1", b"one").unwrap();

        assert_eq!(store.get(b"pos:1").unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.get(b"pos:2").unwrap(), None);
        assert!(store.delete(b"pos:1").unwrap());
        assert!(!store.delete(b"pos:1").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_prefix_scan_is_ordered() {
        let store = InMemoryStore::new();
        store.set(b"pos:2", b"b").unwrap();
        store.set(b"state:engine", b"s").unwrap();
        store.set(b"pos:1", b"a").unwrap();
        store.set(b"po", b"x").unwrap();

        let keys = store.list_prefix(prefixes::POSITION).unwrap();
        assert_eq!(keys, vec![b"pos:1".to_vec(), b"pos:2".to_vec()]);
        assert_eq!(
            store.list_prefix(prefixes::STATE).unwrap(),
            vec![ENGINE_STATE_KEY.to_vec()]
        );
    }

    #[test]
    fn test_typed_store_u128() {
        let store = TypedStore::new(InMemoryStore::new());
        store.set(b"amount", &(7u128 << 100)).unwrap();
        assert_eq!(store.get::<u128>(b"amount").unwrap(), Some(7u128 << 100));
        assert_eq!(store.get::<u128>(b"missing").unwrap(), None);

        store.set(b"short", &1u8).unwrap();
        assert!(matches!(
            store.get::<u128>(b"short"),
            Err(Error::Deserialization(_))
        ));
    }

    #[test]
    fn test_make_key() {
        assert_eq!(make_key(prefixes::POSITION, b"12"), b"pos:12".to_vec());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path()).unwrap();
            store.set(b"state:engine", &[0xde, 0xad]).unwrap();
            store.flush().unwrap();
            assert!(store.snapshot_path().exists());
        }

        let store = FileStore::new(dir.path()).unwrap();
        assert_eq!(store.get(b"state:engine").unwrap(), Some(vec![0xde, 0xad]));
        assert!(!dir.path().join("snapshot.json.tmp").exists());
    }

    #[test]
    fn test_file_store_prefix_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.set(b"pos:10", b"b").unwrap();
        store.set(b"pos:1", b"a").unwrap();
        store.set(b"state:engine", b"s").unwrap();

        assert_eq!(
            store.list_prefix(prefixes::POSITION).unwrap(),
            vec![b"pos:1".to_vec(), b"pos:10".to_vec()]
        );
        assert!(store.list_prefix(b"missing:").unwrap().is_empty());
    }

    #[test]
    fn test_file_store_unflushed_writes_are_lost() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path()).unwrap();
            store.set(b"pos:1", b"x").unwrap();
        }
        let store = FileStore::new(dir.path()).unwrap();
        assert_eq!(store.get(b"pos:1").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("snapshot.json"),
            r#"{"version":99,"written_at":"","entries":{}}"#,
        )
        .unwrap();
        assert!(matches!(FileStore::new(dir.path()), Err(Error::Storage(_))));
    }
}
