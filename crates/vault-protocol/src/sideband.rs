//! Sideband multiplexing (`side-band-64k`).
//!
//! After negotiation, every frame's first byte selects a logical channel:
//! band 1 carries pack data, bands 2 and 3 are progress and error. This
//! server only emits band 1.

use std::io::Write;

use crate::pktline::{PktEncoder, MAX_PKT_DATA_LEN};
use crate::ProtocolError;

/// Sideband channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Pack data (band 1).
    Data = 1,
    /// Progress messages (band 2).
    Progress = 2,
    /// Fatal error (band 3).
    Error = 3,
}

/// Maximum pack data per frame: one byte of each payload is the band.
pub const MAX_DATA_CHUNK: usize = MAX_PKT_DATA_LEN - 1;

/// Send `data` over the given band, chunked into maximal frames.
pub fn write_band<W: Write>(
    encoder: &mut PktEncoder<W>,
    band: Band,
    data: &[u8],
) -> Result<(), ProtocolError> {
    for chunk in data.chunks(MAX_DATA_CHUNK) {
        let mut frame = Vec::with_capacity(1 + chunk.len());
        frame.push(band as u8);
        frame.extend_from_slice(chunk);
        encoder.write_line(&frame)?;
    }
    Ok(())
}
