use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Raw key/value medium behind the result cache
pub trait CacheStore: Send + Sync {
    fn read(&self, key: &str) -> io::Result<Option<String>>;

    fn write(&self, key: &str, value: &str) -> io::Result<()>;

    fn remove(&self, key: &str) -> io::Result<()>;

    /// Remove every entry, returning how many were removed
    fn clear(&self) -> io::Result<u64>;
}

/// Process-local store, lost on exit
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheStore for MemoryStore {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> io::Result<u64> {
        let mut entries = self.lock();
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }
}

/// One JSON file per key under a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Percent-encoded so distinct keys never share a file
    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl CacheStore for FileStore {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs_err::read_to_string(self.entry_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        fs_err::create_dir_all(&self.dir)?;
        fs_err::write(self.entry_path(key), value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs_err::remove_file(self.entry_path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn clear(&self) -> io::Result<u64> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs_err::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs_err::remove_file(&path)?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache"));

        assert_eq!(store.read("a.mp3-10-5").unwrap(), None);
        store.write("a.mp3-10-5", "{\"x\":1}").unwrap();
        assert_eq!(store.read("a.mp3-10-5").unwrap().as_deref(), Some("{\"x\":1}"));

        store.remove("a.mp3-10-5").unwrap();
        assert_eq!(store.read("a.mp3-10-5").unwrap(), None);

        // Removing a missing entry is not an error
        store.remove("a.mp3-10-5").unwrap();
    }

    #[test]
    fn test_file_store_keeps_similar_keys_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.write("a?b.png-10-1", "first").unwrap();
        store.write("a/b.png-10-1", "second").unwrap();

        assert_eq!(store.read("a_b.png-10-1").unwrap(), None);
        assert_eq!(store.read("a?b.png-10-1").unwrap().as_deref(), Some("first"));
        assert_eq!(store.read("a/b.png-10-1").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_file_store_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.write("one", "1").unwrap();
        store.write("two", "2").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_file_store_clear_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("never-created"));
        assert_eq!(store.clear().unwrap(), 0);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.write("k", "v").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.is_empty());
    }
}
