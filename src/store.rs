use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::PathBuf;
use std::rc::Rc;

use log::{info, warn};

use crate::CACHE_PREFIX;

/// One entry yielded by store enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub path: String,
    pub size: u64,
}

/// The persistent block device, SPIFFS-shaped: flat byte-addressable files,
/// a fixed capacity, and enumeration in whatever order the device likes.
pub trait BlockStore {
    type Reader: Read + Seek;
    type Writer: Write;

    fn total_bytes(&self) -> u64;
    fn used_bytes(&self) -> u64;
    fn exists(&self, path: &str) -> bool;
    fn size_of(&self, path: &str) -> Option<u64>;
    /// Open a fresh entry for writing, truncating any existing one.
    fn create(&mut self, path: &str) -> io::Result<Self::Writer>;
    fn open(&self, path: &str) -> io::Result<Self::Reader>;
    fn remove(&mut self, path: &str) -> io::Result<()>;
    fn list(&self) -> io::Result<Vec<StoreEntry>>;

    fn free_bytes(&self) -> u64 {
        self.total_bytes().saturating_sub(self.used_bytes())
    }
}

/// A flat directory on the host filesystem with a configured capacity.
///
/// Store paths keep the device convention of a leading `/`; they are mapped
/// to file names under the root directory.
pub struct DirStore {
    root: PathBuf,
    capacity: u64,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>, capacity: u64) -> Self {
        Self { root: root.into(), capacity }
    }

    fn file_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl BlockStore for DirStore {
    type Reader = fs::File;
    type Writer = fs::File;

    fn total_bytes(&self) -> u64 {
        self.capacity
    }

    fn used_bytes(&self) -> u64 {
        self.list().map(|entries| entries.iter().map(|e| e.size).sum()).unwrap_or(0)
    }

    fn exists(&self, path: &str) -> bool {
        self.file_path(path).is_file()
    }

    fn size_of(&self, path: &str) -> Option<u64> {
        fs::metadata(self.file_path(path)).ok().map(|m| m.len())
    }

    fn create(&mut self, path: &str) -> io::Result<Self::Writer> {
        fs::File::create(self.file_path(path))
    }

    fn open(&self, path: &str) -> io::Result<Self::Reader> {
        fs::File::open(self.file_path(path))
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        fs::remove_file(self.file_path(path))
    }

    fn list(&self) -> io::Result<Vec<StoreEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            entries.push(StoreEntry {
                path: format!("/{}", entry.file_name().to_string_lossy()),
                size: meta.len(),
            });
        }
        Ok(entries)
    }
}

/// In-memory store with a hard capacity. Stands in for the flash device on
/// the host: writes past capacity fail the way a full SPIFFS partition does.
#[derive(Clone)]
pub struct MemStore {
    inner: Rc<RefCell<MemInner>>,
}

struct MemInner {
    files: BTreeMap<String, Vec<u8>>,
    capacity: u64,
}

impl MemInner {
    fn used(&self) -> u64 {
        self.files.values().map(|data| data.len() as u64).sum()
    }
}

impl MemStore {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MemInner { files: BTreeMap::new(), capacity })),
        }
    }

    /// Seed an entry directly, bypassing the capacity check.
    pub fn insert(&mut self, path: &str, data: &[u8]) {
        self.inner.borrow_mut().files.insert(path.into(), data.to_vec());
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.borrow().files.get(path).cloned()
    }
}

pub struct MemWriter {
    inner: Rc<RefCell<MemInner>>,
    path: String,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        if inner.used() + buf.len() as u64 > inner.capacity {
            return Err(io::Error::other("store full"));
        }
        let file = inner.files.entry(self.path.clone()).or_default();
        file.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlockStore for MemStore {
    type Reader = io::Cursor<Vec<u8>>;
    type Writer = MemWriter;

    fn total_bytes(&self) -> u64 {
        self.inner.borrow().capacity
    }

    fn used_bytes(&self) -> u64 {
        self.inner.borrow().used()
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.borrow().files.contains_key(path)
    }

    fn size_of(&self, path: &str) -> Option<u64> {
        self.inner.borrow().files.get(path).map(|data| data.len() as u64)
    }

    fn create(&mut self, path: &str) -> io::Result<Self::Writer> {
        self.inner.borrow_mut().files.insert(path.into(), Vec::new());
        Ok(MemWriter { inner: Rc::clone(&self.inner), path: path.into() })
    }

    fn open(&self, path: &str) -> io::Result<Self::Reader> {
        match self.inner.borrow().files.get(path) {
            Some(data) => Ok(io::Cursor::new(data.clone())),
            None => Err(io::Error::new(io::ErrorKind::NotFound, path.to_string())),
        }
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        match self.inner.borrow_mut().files.remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, path.to_string())),
        }
    }

    fn list(&self) -> io::Result<Vec<StoreEntry>> {
        Ok(self
            .inner
            .borrow()
            .files
            .iter()
            .map(|(path, data)| StoreEntry { path: path.clone(), size: data.len() as u64 })
            .collect())
    }
}

/// Space-bounded wrapper around a [`BlockStore`]: before a new artifact is
/// admitted, cache entries are evicted until there is room for it.
pub struct CacheStore<S: BlockStore> {
    store: S,
}

impl<S: BlockStore> CacheStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Make room for `required` bytes, deleting cache-namespace entries in
    /// enumeration order until free space suffices. `protected` is never
    /// deleted, nor is anything outside the cache prefix. Returns whether
    /// the requirement was ultimately met.
    ///
    /// Eviction order is whatever the store's enumeration yields, not LRU;
    /// the device exposes no access-time metadata.
    pub fn ensure_capacity(&mut self, required: u64, protected: &str) -> bool {
        let mut free = self.store.free_bytes();
        if free >= required {
            return true;
        }
        let entries = match self.store.list() {
            Ok(entries) => entries,
            Err(err) => {
                warn!("store enumeration failed during cleanup: {err}");
                return false;
            }
        };
        for entry in entries {
            if free >= required {
                break;
            }
            if entry.path == protected || !entry.path.starts_with(CACHE_PREFIX) {
                continue;
            }
            match self.store.remove(&entry.path) {
                Ok(()) => {
                    info!("evicted cached jacket {} ({} bytes) to free space", entry.path, entry.size);
                    free = self.store.free_bytes();
                }
                Err(err) => warn!("failed to evict {}: {err}", entry.path),
            }
        }
        free >= required
    }

    pub fn exists(&self, path: &str) -> bool {
        self.store.exists(path)
    }

    pub fn size_of(&self, path: &str) -> Option<u64> {
        self.store.size_of(path)
    }

    pub fn create(&mut self, path: &str) -> io::Result<S::Writer> {
        self.store.create(path)
    }

    pub fn open(&self, path: &str) -> io::Result<S::Reader> {
        self.store.open(path)
    }

    pub fn remove(&mut self, path: &str) -> io::Result<()> {
        self.store.remove(path)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(entries: &[(&str, usize)], capacity: u64) -> CacheStore<MemStore> {
        let mut store = MemStore::new(capacity);
        for (path, size) in entries {
            store.insert(path, &vec![0u8; *size]);
        }
        CacheStore::new(store)
    }

    #[test]
    fn succeeds_without_eviction_when_space_is_free() {
        let mut cache = cache_with(&[("/jacket-a.png", 100)], 1000);
        assert!(cache.ensure_capacity(500, "/jacket-b.png"));
        assert!(cache.exists("/jacket-a.png"));
    }

    #[test]
    fn evicts_until_requirement_is_met() {
        // 40_000 free; a 20_000-byte eviction makes room for 50_000.
        let mut cache = cache_with(&[("/jacket-old.png", 20_000)], 60_000);
        assert!(cache.ensure_capacity(50_000, "/jacket-new.png"));
        assert!(!cache.exists("/jacket-old.png"));
        assert!(cache.store().free_bytes() >= 50_000);
    }

    #[test]
    fn never_deletes_the_protected_path() {
        let mut cache = cache_with(&[("/jacket-keep.png", 800)], 1000);
        assert!(!cache.ensure_capacity(900, "/jacket-keep.png"));
        assert!(cache.exists("/jacket-keep.png"));
    }

    #[test]
    fn never_deletes_entries_outside_the_cache_namespace() {
        let mut cache = cache_with(&[("/config.json", 600), ("/jacket-a.png", 200)], 1000);
        assert!(!cache.ensure_capacity(900, "/jacket-new.png"));
        assert!(!cache.exists("/jacket-a.png"));
        assert!(cache.exists("/config.json"));
    }

    #[test]
    fn reports_failure_when_no_evictable_entries_remain() {
        let mut cache = cache_with(&[("/other.bin", 900)], 1000);
        assert!(!cache.ensure_capacity(500, "/jacket-x.png"));
    }

    #[test]
    fn stops_evicting_as_soon_as_space_suffices() {
        let mut cache = cache_with(
            &[("/jacket-a.png", 400), ("/jacket-b.png", 400)],
            1000,
        );
        assert!(cache.ensure_capacity(500, "/jacket-c.png"));
        // BTreeMap enumeration yields /jacket-a.png first; removing it
        // already frees enough.
        assert!(cache.exists("/jacket-b.png"));
    }

    #[test]
    fn mem_store_rejects_writes_past_capacity() {
        let mut store = MemStore::new(10);
        let mut writer = store.create("/jacket-x.png").unwrap();
        assert!(writer.write_all(&[0u8; 8]).is_ok());
        assert!(writer.write_all(&[0u8; 8]).is_err());
    }

    #[test]
    fn dir_store_round_trips_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path(), 10_000);
        {
            let mut writer = store.create("/jacket-1.png").unwrap();
            writer.write_all(b"hello").unwrap();
        }
        assert!(store.exists("/jacket-1.png"));
        assert_eq!(store.size_of("/jacket-1.png"), Some(5));
        assert_eq!(store.used_bytes(), 5);
        let entries = store.list().unwrap();
        assert_eq!(entries, vec![StoreEntry { path: "/jacket-1.png".into(), size: 5 }]);
        store.remove("/jacket-1.png").unwrap();
        assert!(!store.exists("/jacket-1.png"));
    }
}
