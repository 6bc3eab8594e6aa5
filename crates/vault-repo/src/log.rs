//! JSON-backed revision log.
//!
//! The log is a single self-describing blob (`revisions.json`, a JSON
//! array of ref maps) plus one `<i>.pack` blob per appended revision.
//! Self-describing text keeps the layout portable across blob backends,
//! which are opaque and usually encrypted; one blob per pack lets a fetch
//! read exactly the range it needs.

use vault_store::{BlobStore, StoreError};

use crate::{RepoError, Revision, RevisionStore};

/// Blob name of the revision index.
pub const REVISIONS_BLOB: &str = "revisions.json";

/// Blob name of the packfile for revision `index`.
pub fn pack_blob_name(index: usize) -> String {
    format!("{index}.pack")
}

/// [`RevisionStore`] over any [`BlobStore`].
pub struct JsonRevisionLog<S> {
    store: S,
}

impl<S: BlobStore> JsonRevisionLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: BlobStore> RevisionStore for JsonRevisionLog<S> {
    fn get_revisions(&self) -> Result<Vec<Revision>, RepoError> {
        match self.store.read(REVISIONS_BLOB) {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(StoreError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_new_revision(&mut self, rev: Revision, pack: &[u8]) -> Result<(), RepoError> {
        let mut revisions = self.get_revisions()?;
        revisions.push(rev);
        let index = revisions.len() - 1;

        // Index first, pack second: a crash in between leaves a revision
        // with no pack, which the next fetch reports as a storage error
        // instead of silently serving truncated history.
        self.store
            .write(REVISIONS_BLOB, &serde_json::to_vec(&revisions)?)?;
        self.store.write(&pack_blob_name(index), pack)?;

        tracing::debug!(index, pack_bytes = pack.len(), "appended revision");
        Ok(())
    }

    fn read_packfile(&self, index: usize) -> Result<Vec<u8>, RepoError> {
        Ok(self.store.read(&pack_blob_name(index))?)
    }
}
