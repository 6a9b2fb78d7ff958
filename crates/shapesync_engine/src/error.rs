//! Error types for the sync engine.

use shapesync_codec::CodecError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing a room.
///
/// Nothing in the engine escalates these to a crash: decode errors are
/// caught per message and logged, stream and submission errors feed the
/// connection state machine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A single message failed to parse.
    #[error("decode error: {0}")]
    Decode(#[from] CodecError),

    /// A shape subscription could not be established.
    #[error("failed to open shape stream: {message}")]
    StreamOpen {
        /// Description of the open failure.
        message: String,
    },

    /// An HTTP submission failed.
    #[error("submission failed: {message}")]
    Submission {
        /// Description of the submission failure.
        message: String,
        /// Whether the submission can be retried.
        retryable: bool,
    },
}

impl SyncError {
    /// Creates a stream open error.
    pub fn stream_open(message: impl Into<String>) -> Self {
        Self::StreamOpen {
            message: message.into(),
        }
    }

    /// Creates a retryable submission error.
    pub fn submission_retryable(message: impl Into<String>) -> Self {
        Self::Submission {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable submission error.
    pub fn submission_fatal(message: impl Into<String>) -> Self {
        Self::Submission {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failed operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Submission { retryable, .. } => *retryable,
            SyncError::StreamOpen { .. } => true,
            SyncError::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::submission_retryable("connection reset").is_retryable());
        assert!(!SyncError::submission_fatal("invalid payload").is_retryable());
        assert!(SyncError::stream_open("dns failure").is_retryable());
        assert!(!SyncError::Decode(CodecError::UnexpectedEof).is_retryable());
    }

    #[test]
    fn decode_error_converts() {
        fn inner() -> SyncResult<()> {
            Err(CodecError::InvalidUtf8)?;
            Ok(())
        }
        assert!(matches!(inner(), Err(SyncError::Decode(_))));
    }
}
