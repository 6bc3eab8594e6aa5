//! Hex encoding and decoding for object ids.

use crate::HashError;

/// Lookup table: ASCII byte → nibble value (255 = invalid).
const HEX_DECODE: [u8; 256] = {
    let mut table = [255u8; 256];
    let mut i = 0u8;
    loop {
        match i {
            b'0'..=b'9' => table[i as usize] = i - b'0',
            b'a'..=b'f' => table[i as usize] = i - b'a' + 10,
            b'A'..=b'F' => table[i as usize] = i - b'A' + 10,
            _ => {}
        }
        if i == 255 {
            break;
        }
        i += 1;
    }
    table
};

const HEX_ENCODE: &[u8; 16] = b"0123456789abcdef";

/// Hex-encode `bytes` to a new lowercase `String`.
pub fn hex_to_string(bytes: &[u8]) -> String {
    let mut buf = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        buf.push(HEX_ENCODE[(b >> 4) as usize]);
        buf.push(HEX_ENCODE[(b & 0x0f) as usize]);
    }
    // SAFETY: only ASCII hex digits are pushed.
    unsafe { String::from_utf8_unchecked(buf) }
}

/// Decode a hex string into `buf`. The hex string length must be exactly
/// `buf.len() * 2`.
pub fn hex_decode(hex: &str, buf: &mut [u8]) -> Result<(), HashError> {
    let hex = hex.as_bytes();
    if hex.len() != buf.len() * 2 {
        return Err(HashError::InvalidHexLength {
            expected: buf.len() * 2,
            actual: hex.len(),
        });
    }
    for (i, slot) in buf.iter_mut().enumerate() {
        let hi = HEX_DECODE[hex[i * 2] as usize];
        let lo = HEX_DECODE[hex[i * 2 + 1] as usize];
        if hi == 255 {
            return Err(HashError::InvalidHex {
                position: i * 2,
                character: hex[i * 2] as char,
            });
        }
        if lo == 255 {
            return Err(HashError::InvalidHex {
                position: i * 2 + 1,
                character: hex[i * 2 + 1] as char,
            });
        }
        *slot = (hi << 4) | lo;
    }
    Ok(())
}
