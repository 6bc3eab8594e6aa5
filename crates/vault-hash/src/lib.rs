//! Object identity for the git-vault remote.
//!
//! Provides the `ObjectId` type (a 20-byte SHA-1 digest), hex
//! encoding/decoding, and the digest helper used for pack trailers.

mod error;
pub mod hex;
mod oid;

pub use error::HashError;
pub use oid::ObjectId;

/// Compute the SHA-1 digest of `data` as an [`ObjectId`].
///
/// This is the hash used for packfile trailers; object-content hashing
/// never happens on the server side.
pub fn sha1_digest(data: &[u8]) -> ObjectId {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    ObjectId::from_raw(hasher.finalize().into())
}
