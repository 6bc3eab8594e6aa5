//! Revisioned repository storage for the git-vault remote.
//!
//! The server's state is an append-only log of [`Revision`] snapshots (the
//! full ref map at one point in time) with one incremental packfile per
//! appended revision. The log lives in a blob store as `revisions.json`
//! plus `<i>.pack` blobs; [`merge_packfiles`] splices any contiguous run
//! of those packs into a single pack for a fetching client.

mod log;
mod merger;
mod revision;

pub use log::{pack_blob_name, JsonRevisionLog, REVISIONS_BLOB};
pub use merger::{
    merge_packfiles, EMPTY_PACK_HEADER, PACK_HEADER_LEN, PACK_SIGNATURE, PACK_TRAILER_LEN,
    PACK_VERSION,
};
pub use revision::{RefUpdate, Revision, DEFAULT_BRANCH, HEAD};

use vault_store::StoreError;

/// Errors from the revision log and the packfile merger.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid revision log: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt packfile: {0}")]
    CorruptPack(String),

    #[error("received packfile too large: {size} bytes (limit {limit})")]
    PackTooLarge { size: usize, limit: usize },
}

/// Typed persistence of the revision log.
///
/// One value of this is owned by the protocol driver for the duration of a
/// request; it is loaded fresh per request and written back only on a
/// successful push.
pub trait RevisionStore {
    /// All revisions, chronological. An absent log is an empty repository.
    fn get_revisions(&self) -> Result<Vec<Revision>, RepoError>;

    /// Append `rev` to the log and persist `pack` as its packfile.
    fn save_new_revision(&mut self, rev: Revision, pack: &[u8]) -> Result<(), RepoError>;

    /// The raw packfile bytes saved alongside revision `index`.
    fn read_packfile(&self, index: usize) -> Result<Vec<u8>, RepoError>;
}
