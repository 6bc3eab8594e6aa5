//! Local-directory blob store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{BlobStore, StoreError};

/// Stores each blob as a file under a root directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl BlobStore for LocalStore {
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        match std::fs::read(self.blob_path(name)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        std::fs::write(self.blob_path(name), data)?;
        Ok(())
    }
}
