//! FILENAME: persistence/src/file_store.rs
//! PURPOSE: A directory-backed ObjectStore (one file per key).
//! CONTEXT: Keys like "row-cache/<id>" map to sanitized file names under
//! a root directory. Writes replace the whole file (last-writer-wins);
//! a missing file on load is the recoverable Not-Found case.

use engine::{ObjectStore, StoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stores each object as a file under a root directory.
#[derive(Debug)]
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    /// Opens (creating if needed) a store rooted at the given directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(FileObjectStore { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys carry '/' separators; flatten to a single safe file name.
        let safe: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
                _ => '_',
            })
            .collect();
        self.root.join(safe)
    }
}

impl ObjectStore for FileObjectStore {
    fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        fs::write(self.path_for(key), bytes)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::ObjectNotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_and_loads_under_sanitized_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();

        store.save("row-cache/abc-123", b"rows".to_vec()).unwrap();
        assert_eq!(store.load("row-cache/abc-123").unwrap(), b"rows");

        // Distinct keys stay distinct after sanitizing.
        store.save("report/p/d", b"report".to_vec()).unwrap();
        assert_eq!(store.load("report/p/d").unwrap(), b"report");
        assert_eq!(store.load("row-cache/abc-123").unwrap(), b"rows");
    }

    #[test]
    fn missing_key_is_object_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();

        let err = store.load("row-cache/missing").unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound { .. }));
    }

    #[test]
    fn save_overwrites_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();

        store.save("k", b"one".to_vec()).unwrap();
        store.save("k", b"two".to_vec()).unwrap();
        assert_eq!(store.load("k").unwrap(), b"two");
    }
}
