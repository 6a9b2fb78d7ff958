//! Binary encoder for the wire protocol.

/// A growable binary encoder.
///
/// Integers are written as little-endian varints (7 payload bits per
/// byte, high bit set on continuation). Byte arrays and strings are
/// length-prefixed with a varint.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Creates a new empty encoder.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates an encoder with a pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Writes an unsigned integer as a varint.
    pub fn write_var_u64(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a varint length prefix followed by the bytes.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_var_u64(bytes.len() as u64);
        self.write_raw(bytes);
    }

    /// Writes a UTF-8 string as length-prefixed bytes.
    pub fn write_string(&mut self, text: &str) {
        self.write_var_bytes(text.as_bytes());
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the encoder and returns the encoded bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Decoder;

    #[test]
    fn varint_small_values_are_one_byte() {
        for value in [0u64, 1, 63, 127] {
            let mut enc = Encoder::new();
            enc.write_var_u64(value);
            assert_eq!(enc.len(), 1, "value {value}");
        }
    }

    #[test]
    fn varint_boundary_values() {
        for value in [127u64, 128, 16_383, 16_384, u64::MAX] {
            let mut enc = Encoder::new();
            enc.write_var_u64(value);
            let bytes = enc.into_vec();
            let mut dec = Decoder::new(&bytes);
            assert_eq!(dec.read_var_u64().unwrap(), value);
            assert!(dec.is_empty());
        }
    }

    #[test]
    fn var_bytes_prefix() {
        let mut enc = Encoder::new();
        enc.write_var_bytes(&[9, 8, 7]);
        let bytes = enc.into_vec();
        assert_eq!(bytes, vec![3, 9, 8, 7]);
    }

    #[test]
    fn string_roundtrip() {
        let mut enc = Encoder::new();
        enc.write_string("héllo");
        let bytes = enc.into_vec();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.read_string().unwrap(), "héllo");
    }
}
