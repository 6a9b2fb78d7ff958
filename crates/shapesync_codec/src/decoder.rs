//! Binary decoder for the wire protocol.

use crate::error::{CodecError, CodecResult};

/// A bounds-checked binary decoder over a byte slice.
///
/// Every read validates against the remaining input, so malformed or
/// truncated frames surface as [`CodecError`] values rather than panics.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns true if all input has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        if self.pos >= self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Reads a varint-encoded unsigned integer.
    pub fn read_var_u64(&mut self) -> CodecResult<u64> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;

        loop {
            let byte = self.read_u8()?;
            // 10 bytes max for a u64; the final byte may only carry one bit.
            if shift >= 63 && byte > 1 {
                return Err(CodecError::VarIntOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(CodecError::VarIntOverflow);
            }
        }
    }

    /// Reads `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Reads a varint length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_var_u64()?;
        let remaining = self.remaining();
        if len > remaining as u64 {
            return Err(CodecError::LengthOutOfBounds {
                claimed: len,
                remaining,
            });
        }
        self.read_raw(len as usize)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> CodecResult<&'a str> {
        let bytes = self.read_var_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}
