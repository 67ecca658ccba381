//! # Token Registry
//!
//! Every command written to GDB is prefixed with a numeric token, and GDB
//! echoes that token on the `^done` / `^error` record that completes the
//! command. The token is the only thing that tells the reader where the text
//! collected for a command should go.
//!
//! The token space is split in two:
//!
//! - **Fixed tokens** (`0..=13`): one per destination that exists for the whole
//!   session (context panes, heap views, probes).
//! - **Watch tokens** (`WATCH_TOKEN_BASE..`): `base + index`, one per active
//!   memory watch. The base sits well above the last fixed token so the two
//!   ranges can never collide.
//!
//! [`Token`] is the typed view of that space. Conversions to and from the raw
//! integer happen only at the wire boundary.

use std::fmt;

/// First raw token of the watch range.
pub const WATCH_TOKEN_BASE: u64 = 1000;

/// Fixed context panes that receive routed console output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextPane
{
    /// The main output pane (command results, program output)
    Main,
    Registers,
    Stack,
    Disassembly,
    Code,
    Backtrace,
}

impl ContextPane
{
    /// Every pane, main first.
    pub const ALL: [ContextPane; 6] = [
        Self::Main,
        Self::Registers,
        Self::Stack,
        Self::Disassembly,
        Self::Code,
        Self::Backtrace,
    ];

    /// Panes refreshed after each user command, in the order the refresh
    /// commands are issued. `Main` is not a pwndbg context section.
    pub const REFRESHED: [ContextPane; 5] = [
        Self::Registers,
        Self::Stack,
        Self::Disassembly,
        Self::Code,
        Self::Backtrace,
    ];

    /// pwndbg context section name (`context <name>`), also used as the pane id.
    #[must_use]
    pub const fn name(self) -> &'static str
    {
        match self {
            Self::Main => "main",
            Self::Registers => "regs",
            Self::Stack => "stack",
            Self::Disassembly => "disasm",
            Self::Code => "code",
            Self::Backtrace => "backtrace",
        }
    }

    /// Reverse of [`ContextPane::name`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self>
    {
        Self::ALL.into_iter().find(|pane| pane.name() == name)
    }
}

impl fmt::Display for ContextPane
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Position of a watch inside the watch token range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchIndex(u32);

impl WatchIndex
{
    /// Create an index from its raw value.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self
    {
        Self(value)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

impl fmt::Display for WatchIndex
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

/// Typed correlation token.
///
/// ## Example
///
/// ```rust
/// use pwnview_core::token::{ContextPane, Token, WatchIndex};
///
/// assert_eq!(Token::from_raw(5), Some(Token::Context(ContextPane::Registers)));
/// assert_eq!(Token::Watch(WatchIndex::from_raw(3)).raw(), 1003);
/// assert_eq!(Token::from_raw(500), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token
{
    /// Output is thrown away (settings changes, housekeeping)
    Discard,
    /// Command typed by the user; output goes to the main pane
    UserMain,
    /// Command issued by the front end for a specific pane
    Context(ContextPane),
    /// `heap` summary
    Heap,
    /// `bins` summary
    Bins,
    /// `try_free` result
    TryFree,
    /// `$fs_base` probe shown next to the registers
    FsBase,
    /// Listing of the debugger's commands
    CommandCatalog,
    /// `xinfo` address lookup
    AddressInfo,
    /// Hexdump of an active watch
    Watch(WatchIndex),
}

impl Token
{
    /// Raw integer written on the wire.
    #[must_use]
    pub const fn raw(self) -> u64
    {
        match self {
            Self::Discard => 0,
            Self::UserMain => 1,
            Self::Context(ContextPane::Main) => 2,
            Self::Context(ContextPane::Disassembly) => 3,
            Self::Context(ContextPane::Code) => 4,
            Self::Context(ContextPane::Registers) => 5,
            Self::Context(ContextPane::Stack) => 6,
            Self::Context(ContextPane::Backtrace) => 7,
            Self::Heap => 8,
            Self::Bins => 9,
            Self::TryFree => 10,
            Self::FsBase => 11,
            Self::CommandCatalog => 12,
            Self::AddressInfo => 13,
            Self::Watch(index) => WATCH_TOKEN_BASE + index.0 as u64,
        }
    }

    /// Decode a raw token. Values in the gap between the fixed range and the
    /// watch range are not ours and decode to `None`.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self>
    {
        let token = match raw {
            0 => Self::Discard,
            1 => Self::UserMain,
            2 => Self::Context(ContextPane::Main),
            3 => Self::Context(ContextPane::Disassembly),
            4 => Self::Context(ContextPane::Code),
            5 => Self::Context(ContextPane::Registers),
            6 => Self::Context(ContextPane::Stack),
            7 => Self::Context(ContextPane::Backtrace),
            8 => Self::Heap,
            9 => Self::Bins,
            10 => Self::TryFree,
            11 => Self::FsBase,
            12 => Self::CommandCatalog,
            13 => Self::AddressInfo,
            raw if raw >= WATCH_TOKEN_BASE => {
                let index = u32::try_from(raw - WATCH_TOKEN_BASE).ok()?;
                Self::Watch(WatchIndex(index))
            }
            _ => return None,
        };
        Some(token)
    }

    /// The pane this token routes to, for pane-routed tokens.
    #[must_use]
    pub const fn pane(self) -> Option<ContextPane>
    {
        match self {
            Self::UserMain => Some(ContextPane::Main),
            Self::Context(pane) => Some(pane),
            _ => None,
        }
    }
}

impl fmt::Display for Token
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Discard => f.write_str("discard"),
            Self::UserMain => f.write_str("user-main"),
            Self::Context(pane) => write!(f, "context-{pane}"),
            Self::Heap => f.write_str("heap"),
            Self::Bins => f.write_str("bins"),
            Self::TryFree => f.write_str("try-free"),
            Self::FsBase => f.write_str("fs-base"),
            Self::CommandCatalog => f.write_str("command-catalog"),
            Self::AddressInfo => f.write_str("address-info"),
            Self::Watch(index) => write!(f, "watch{index}"),
        }
    }
}
