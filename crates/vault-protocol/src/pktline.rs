//! Pkt-line framing (protocol v1 subset).
//!
//! Each frame is a 4-hex-digit length header (inclusive of the header
//! itself) followed by the payload; the literal `0000` is a flush frame
//! marking the end of a section. The decoder also exposes raw reads for
//! the push pack body, which arrives unframed after the ref-update
//! section.

use std::io::{Read, Write};

use crate::ProtocolError;

/// Maximum data per frame (65520 - 4 = 65516).
pub const MAX_PKT_DATA_LEN: usize = 65516;

/// Pkt-line encoder.
///
/// Frames are flushed through to the underlying writer as they are
/// written: the protocol is interactive and the client blocks on our
/// responses.
pub struct PktEncoder<W> {
    writer: W,
}

impl<W: Write> PktEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one data frame.
    pub fn write_line(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if data.len() > MAX_PKT_DATA_LEN {
            return Err(ProtocolError::InvalidPktLine(format!(
                "data too long for pkt-line: {} bytes (max {})",
                data.len(),
                MAX_PKT_DATA_LEN
            )));
        }
        write!(self.writer, "{:04x}", data.len() + 4)?;
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write a flush frame (`0000`).
    pub fn write_flush(&mut self) -> Result<(), ProtocolError> {
        self.writer.write_all(b"0000")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Consume the encoder and return the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Pkt-line decoder.
pub struct PktDecoder<R> {
    reader: R,
}

impl<R: Read> PktDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read one frame. Flush frames decode as `None`.
    ///
    /// End of input, including mid-frame truncation, surfaces as an I/O
    /// error: the protocol always ends inside a section the driver is
    /// actively consuming.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf)?;

        let len_str = std::str::from_utf8(&len_buf).map_err(|_| {
            ProtocolError::InvalidPktLine(format!("invalid length bytes: {len_buf:?}"))
        })?;
        let len = u16::from_str_radix(len_str, 16).map_err(|_| {
            ProtocolError::InvalidPktLine(format!("invalid length: {len_str:?}"))
        })? as usize;

        match len {
            0 => Ok(None),
            1..=3 => Err(ProtocolError::InvalidPktLine(format!(
                "length {len} is invalid (minimum data frame is 4)"
            ))),
            _ => {
                let data_len = len - 4;
                if data_len > MAX_PKT_DATA_LEN {
                    return Err(ProtocolError::InvalidPktLine(format!(
                        "frame too long: {data_len} bytes"
                    )));
                }
                let mut data = vec![0u8; data_len];
                self.reader.read_exact(&mut data)?;
                Ok(Some(data))
            }
        }
    }

    /// Read raw bytes, bypassing the framing. Used for the push body.
    pub fn read_raw(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }

    /// Consume the decoder and return the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
