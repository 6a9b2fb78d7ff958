//! # shapesync Codec
//!
//! Variable-length binary encoding for the shapesync wire protocol.
//!
//! This crate provides:
//! - `Encoder`/`Decoder` for varint integers, length-prefixed byte
//!   arrays, and UTF-8 strings
//! - Base64 wrapping for transporting binary frames inside JSON
//!
//! The format is the 7-bits-per-byte little-endian varint scheme used by
//! the sync protocol: integers grow one byte per 7 bits, byte arrays and
//! strings carry a varint length prefix.
//!
//! ## Usage
//!
//! ```
//! use shapesync_codec::{Decoder, Encoder};
//!
//! let mut enc = Encoder::new();
//! enc.write_var_u64(42);
//! enc.write_string("hello");
//! let bytes = enc.into_vec();
//!
//! let mut dec = Decoder::new(&bytes);
//! assert_eq!(dec.read_var_u64().unwrap(), 42);
//! assert_eq!(dec.read_string().unwrap(), "hello");
//! assert!(dec.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{CodecError, CodecResult};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Encodes bytes to a standard base64 string.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes a standard base64 string back to bytes.
///
/// # Errors
///
/// Returns [`CodecError::InvalidBase64`] if the input is not valid
/// standard-alphabet base64.
pub fn from_base64(text: &str) -> CodecResult<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| CodecError::InvalidBase64 {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_roundtrip() {
        let bytes = vec![0u8, 1, 2, 254, 255];
        let text = to_base64(&bytes);
        assert_eq!(from_base64(&text).unwrap(), bytes);
    }

    #[test]
    fn base64_rejects_garbage() {
        assert!(from_base64("not base64!!").is_err());
    }
}
