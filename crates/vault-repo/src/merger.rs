//! Structural packfile merging.
//!
//! Splices the object entries of N packs into one pack container: shared
//! header, concatenated bodies, summed object count, recomputed SHA-1
//! trailer. Object entries are never parsed. OFS_DELTA entries stay valid
//! because each source body is copied contiguously and unmodified, so
//! relative offsets within a source pack are preserved; REF_DELTA entries
//! name their base by object id and may resolve into any earlier pack in
//! the merge.

use vault_hash::sha1_digest;

use crate::RepoError;

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_LEN: usize = 12;
pub const PACK_TRAILER_LEN: usize = 20;

/// The header-only empty pack, as transmitted for an empty push body.
///
/// Contemporary git accepts the missing trailer when the object count is
/// zero; [`merge_packfiles`] of an empty input produces the 32-byte form
/// with a trailer instead, and both are accepted on read.
pub const EMPTY_PACK_HEADER: [u8; 12] =
    *b"PACK\x00\x00\x00\x02\x00\x00\x00\x00";

/// Merge `packs` into a single well-formed pack container.
///
/// Each input must be at least header + trailer long; its declared object
/// count is read from bytes 8..12 and its body (everything between header
/// and trailer) is copied verbatim.
pub fn merge_packfiles(packs: &[Vec<u8>]) -> Result<Vec<u8>, RepoError> {
    let bodies: usize = packs
        .iter()
        .map(|p| p.len().saturating_sub(PACK_HEADER_LEN + PACK_TRAILER_LEN))
        .sum();
    let mut out = Vec::with_capacity(PACK_HEADER_LEN + bodies + PACK_TRAILER_LEN);

    out.extend_from_slice(PACK_SIGNATURE);
    out.extend_from_slice(&PACK_VERSION.to_be_bytes());
    // Object count placeholder, patched below.
    out.extend_from_slice(&0u32.to_be_bytes());

    let mut count: u32 = 0;
    for (i, pack) in packs.iter().enumerate() {
        if pack.len() < PACK_HEADER_LEN + PACK_TRAILER_LEN {
            return Err(RepoError::CorruptPack(format!(
                "input pack {i} is {} bytes, shorter than header and trailer",
                pack.len()
            )));
        }
        if &pack[..4] != PACK_SIGNATURE {
            return Err(RepoError::CorruptPack(format!(
                "input pack {i} has no PACK signature"
            )));
        }
        let declared = u32::from_be_bytes([pack[8], pack[9], pack[10], pack[11]]);
        count = count.checked_add(declared).ok_or_else(|| {
            RepoError::CorruptPack("combined object count overflows u32".into())
        })?;
        out.extend_from_slice(&pack[PACK_HEADER_LEN..pack.len() - PACK_TRAILER_LEN]);
    }

    out[8..12].copy_from_slice(&count.to_be_bytes());
    let trailer = sha1_digest(&out);
    out.extend_from_slice(trailer.as_bytes());
    Ok(out)
}
