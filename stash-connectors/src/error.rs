//! Bot link errors

use thiserror::Error;

/// Errors that can occur on a bot connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Reading or writing the socket failed, including a truncated frame.
    #[error("Bot connection I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecognized message tag; framing of everything after it is undefined.
    #[error("Unknown message tag {0}")]
    UnknownTag(u8),

    /// A string field was not valid UTF-8.
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    /// An outbound string does not fit its 16-bit length prefix.
    #[error("String of {0} bytes is too long for the wire")]
    StringTooLong(usize),

    /// The bot went away before a command could be queued.
    #[error("Bot session closed")]
    SessionClosed,
}

impl ProtocolError {
    /// Whether the peer simply hung up
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

/// Result type for bot link operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
