//! # Error Types
//!
//! Errors produced while decoding or encoding GDB/MI lines.

use thiserror::Error;

/// Error type for the MI codec
///
/// Parse errors carry the byte offset into the offending line so a log line
/// can point at the exact spot GDB (or a misbehaving debuggee) produced
/// something unexpected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError
{
    /// A C-string literal was opened but never closed
    #[error("Unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    /// A character that is not allowed at this position in the grammar
    #[error("Unexpected character {found:?} at offset {pos}")]
    UnexpectedChar
    {
        /// Byte offset into the line
        pos: usize,
        /// The character found there
        found: char,
    },

    /// The line ended in the middle of a record
    #[error("Unexpected end of line")]
    UnexpectedEnd,

    /// `^` was followed by a class GDB does not define
    #[error("Unknown result class: {0}")]
    UnknownResultClass(String),

    /// Token prefix did not fit into a `u64`
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Outbound command text contained a line break
    ///
    /// GDB reads one command per line, so a newline inside the text would
    /// smuggle a second, untagged command into the stream.
    #[error("Command text must not contain line breaks")]
    EmbeddedNewline,
}

/// Convenience alias for codec results
pub type Result<T> = std::result::Result<T, ProtocolError>;
