//! Blob storage for the git-vault remote.
//!
//! A repository is persisted as a flat namespace of named blobs
//! (`revisions.json`, `0.pack`, `1.pack`, …). This crate provides the
//! [`BlobStore`] trait plus the backends the helper ships: a local
//! directory store, an in-memory store for tests, and the
//! [`SecretboxStore`] decorator that transparently applies authenticated
//! encryption to any other backend.

mod local;
mod memory;
mod secretbox;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use secretbox::SecretboxStore;

/// Errors that can occur against a blob store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("failed to verify encrypted blob: {0}")]
    Integrity(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An opaque name→bytes store.
///
/// Implementations distinguish "not found" from other failures so the
/// revision log can treat a missing index as a fresh repository.
/// Reads and writes are whole-value: the encryption decorator has to
/// buffer a complete blob to authenticate it, and every caller in the
/// core consumes blobs wholesale anyway.
pub trait BlobStore {
    /// Read the blob named `name`.
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Write (or overwrite) the blob named `name`.
    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError>;
}

impl<S: BlobStore + ?Sized> BlobStore for &S {
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        (**self).read(name)
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).write(name, data)
    }
}

impl<S: BlobStore + ?Sized> BlobStore for Box<S> {
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        (**self).read(name)
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).write(name, data)
    }
}
