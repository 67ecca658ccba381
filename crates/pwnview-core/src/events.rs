//! Session event types and helpers.
//!
//! Front ends consume these events to update their panes. Every event is a
//! complete, owned payload: the reader thread never shares a buffer with the
//! consumer, it hands over finished bytes.
//!
//! Payloads are the raw bytes GDB produced (pwndbg output is full of ANSI
//! colour escapes); turning them into presentable text is the consumer's job.

use std::sync::mpsc;

use crate::token::{ContextPane, Token, WatchIndex};

/// Event emitted by the response demultiplexer (or by the dispatcher, for
/// write failures reported to the main pane).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent
{
    /// New content for a context pane (main included).
    PaneUpdate
    {
        /// Destination pane
        pane: ContextPane,
        /// Collected output
        content: Vec<u8>,
    },
    /// Output of `heap`
    Heap(Vec<u8>),
    /// Output of `bins`
    Bins(Vec<u8>),
    /// Output of `try_free`
    TryFree(Vec<u8>),
    /// Value of `$fs_base`
    FsBase(Vec<u8>),
    /// Listing of the debugger's commands
    CommandCatalog(Vec<u8>),
    /// Output of `xinfo`
    AddressInfo(Vec<u8>),
    /// Hexdump for an active watch
    WatchResult
    {
        /// Index of the watch, stable for as long as the watch exists
        index: WatchIndex,
        /// Expression the watch was created for
        expression: String,
        /// Hexdump output
        content: Vec<u8>,
    },
    /// The inferior stopped (`true`) or resumed (`false`)
    InferiorStateChanged
    {
        /// Whether the inferior is now stopped
        stopped: bool,
    },
    /// pwndbg's `context-stack-lines` setting changed
    StackLinesChanged(u32),
}

impl SessionEvent
{
    /// Token the event's content was routed by, if it came from a command.
    #[must_use]
    pub const fn token(&self) -> Option<Token>
    {
        match self {
            Self::PaneUpdate { pane: ContextPane::Main, .. } => Some(Token::UserMain),
            Self::PaneUpdate { pane, .. } => Some(Token::Context(*pane)),
            Self::Heap(_) => Some(Token::Heap),
            Self::Bins(_) => Some(Token::Bins),
            Self::TryFree(_) => Some(Token::TryFree),
            Self::FsBase(_) => Some(Token::FsBase),
            Self::CommandCatalog(_) => Some(Token::CommandCatalog),
            Self::AddressInfo(_) => Some(Token::AddressInfo),
            Self::WatchResult { index, .. } => Some(Token::Watch(*index)),
            Self::InferiorStateChanged { .. } | Self::StackLinesChanged(_) => None,
        }
    }

    /// Short name of the destination, suitable for log fields and headings.
    #[must_use]
    pub fn label(&self) -> String
    {
        match self {
            Self::PaneUpdate { pane, .. } => pane.name().to_string(),
            Self::Heap(_) => "heap".to_string(),
            Self::Bins(_) => "bins".to_string(),
            Self::TryFree(_) => "try_free".to_string(),
            Self::FsBase(_) => "fs_base".to_string(),
            Self::CommandCatalog(_) => "commands".to_string(),
            Self::AddressInfo(_) => "xinfo".to_string(),
            Self::WatchResult { expression, .. } => format!("watch {expression}"),
            Self::InferiorStateChanged { .. } => "state".to_string(),
            Self::StackLinesChanged(_) => "stack-lines".to_string(),
        }
    }

    /// Routed payload, for events that carry one.
    #[must_use]
    pub fn content(&self) -> Option<&[u8]>
    {
        match self {
            Self::PaneUpdate { content, .. } | Self::WatchResult { content, .. } => Some(content),
            Self::Heap(content)
            | Self::Bins(content)
            | Self::TryFree(content)
            | Self::FsBase(content)
            | Self::CommandCatalog(content)
            | Self::AddressInfo(content) => Some(content),
            Self::InferiorStateChanged { .. } | Self::StackLinesChanged(_) => None,
        }
    }

    /// Human-readable one-line description of the event.
    #[must_use]
    pub fn describe(&self) -> String
    {
        match self {
            Self::InferiorStateChanged { stopped: true } => "Inferior stopped".to_string(),
            Self::InferiorStateChanged { stopped: false } => "Inferior running".to_string(),
            Self::StackLinesChanged(lines) => format!("Stack context shows {lines} lines"),
            other => {
                let bytes = other.content().map_or(0, <[u8]>::len);
                format!("{} update ({bytes} bytes)", other.label())
            }
        }
    }
}

/// Sender side of the session event channel.
pub type SessionEventSender = mpsc::Sender<SessionEvent>;
/// Receiver side of the session event channel.
pub type SessionEventReceiver = mpsc::Receiver<SessionEvent>;

/// Create a new session event channel.
#[must_use]
pub fn event_channel() -> (SessionEventSender, SessionEventReceiver)
{
    mpsc::channel()
}
