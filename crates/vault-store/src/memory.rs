//! In-memory blob store, used as a test fixture throughout the workspace.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{BlobStore, StoreError};

/// A `HashMap`-backed store.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob directly, bypassing the [`BlobStore`] interface.
    pub fn insert(&self, name: &str, data: impl Into<Vec<u8>>) {
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), data.into());
    }

    /// Snapshot of the blob names currently stored.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of blobs stored.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryStore {
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }
}
