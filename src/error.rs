//! Error taxonomy for codec sessions
//!
//! `open` surfaces these to its caller. Mid-stream failures in `decode` are
//! recorded on the session instead of being returned (see
//! [`CodecSession::take_error`](crate::sound::CodecSession::take_error)).

/// Errors produced while opening or driving a codec session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HcaError {
    /// Header not recognized, oversized, or rejected by the block decoder
    #[error("Format error: {0}")]
    Format(String),

    /// Buffer allocation failed
    #[error("Resource error: {0}")]
    Resource(String),

    /// Short or failed read from the byte source
    #[error("I/O error: read {got} of {expected} bytes at 0x{offset:x}")]
    Io { offset: u64, expected: usize, got: usize },

    /// Source could not be duplicated for the session
    #[error("I/O error: {0}")]
    Source(String),

    /// Block decoder rejected a block
    #[error("Decode error at 0x{offset:x}, code={code}")]
    Decode { offset: u64, code: i32 },
}

/// Result type for session operations
pub type HcaResult<T> = Result<T, HcaError>;
