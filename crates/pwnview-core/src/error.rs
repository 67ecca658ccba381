//! # Error Types
//!
//! Error handling for the session core.
//!
//! We use `thiserror` to generate the `Error` trait implementations and
//! messages. Note that most runtime anomalies never surface as errors at all:
//! write failures are reported to the main pane and protocol oddities are
//! dropped by the reader. What remains here is what a caller can act on.

use thiserror::Error;

use pwnview_protocol::ProtocolError;

/// Main error type for session operations
///
/// ## Error Categories
///
/// 1. **Transport errors**: Io, Spawn, ChannelClosed
/// 2. **Watch errors**: EmptyExpression, WatchExists, UnknownWatch, InvalidByteCount, WatchRangeExhausted
/// 3. **Protocol errors**: Protocol
/// 4. **Configuration errors**: Config
#[derive(Error, Debug)]
pub enum SessionError
{
    /// I/O error talking to the debugger process or reading a file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The debugger executable could not be started
    ///
    /// Usually means `gdb` is not on `PATH`; set `PWNVIEW_GDB` or pass
    /// `--gdb <path>`.
    #[error("Failed to start debugger '{program}': {source}")]
    Spawn
    {
        /// Program that was executed
        program: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The debugger's input or output channel is gone
    #[error("Debugger channel closed")]
    ChannelClosed,

    /// Watch expressions must contain something to evaluate
    #[error("Watch expression is empty")]
    EmptyExpression,

    /// A watch for this expression is already active
    #[error("Watch already exists: {0}")]
    WatchExists(String),

    /// No active watch for this expression
    #[error("No watch for expression: {0}")]
    UnknownWatch(String),

    /// Hexdumps need at least one byte
    #[error("Invalid byte count: {0}")]
    InvalidByteCount(usize),

    /// Every index of the watch token range is taken
    #[error("No free watch index left")]
    WatchRangeExhausted,

    /// A line could not be encoded or decoded as GDB/MI
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Convenience type alias for `Result<T, SessionError>`
pub type Result<T> = std::result::Result<T, SessionError>;
