//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A varint used more bytes than a u64 can hold.
    #[error("varint overflow")]
    VarIntOverflow,

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A claimed length exceeds what the input can contain.
    #[error("length {claimed} exceeds remaining input of {remaining} bytes")]
    LengthOutOfBounds {
        /// Length claimed by the prefix.
        claimed: u64,
        /// Bytes actually remaining.
        remaining: usize,
    },

    /// Invalid base64 input.
    #[error("invalid base64: {message}")]
    InvalidBase64 {
        /// Description of the base64 error.
        message: String,
    },

    /// The frame does not have the expected structure.
    #[error("invalid frame: {message}")]
    InvalidFrame {
        /// Description of the structural error.
        message: String,
    },
}

impl CodecError {
    /// Creates an invalid frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CodecError::UnexpectedEof;
        assert_eq!(err.to_string(), "unexpected end of input");

        let err = CodecError::LengthOutOfBounds {
            claimed: 100,
            remaining: 3,
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("3"));
    }
}
