//! Parsed MI record types.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// A `name=value` pair as it appears after a record's class.
pub type MiResult = (String, Value);

/// Value side of an MI result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value
{
    /// Decoded C-string constant
    Const(String),
    /// `{name=value,...}`
    Tuple(Vec<MiResult>),
    /// `[value,...]` or `[name=value,...]`
    ///
    /// Named list entries are stored as single-entry tuples.
    List(Vec<Value>),
}

impl Value
{
    /// Borrow the string if this is a constant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str>
    {
        match self {
            Self::Const(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a field in a tuple value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value>
    {
        match self {
            Self::Tuple(results) => find(results, name),
            _ => None,
        }
    }
}

/// Find the first result called `name`.
#[must_use]
pub fn find<'a>(results: &'a [MiResult], name: &str) -> Option<&'a Value>
{
    results.iter().find(|(key, _)| key == name).map(|(_, value)| value)
}

/// Class of a `^` result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultClass
{
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

impl ResultClass
{
    /// Wire spelling of the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str
    {
        match self {
            Self::Done => "done",
            Self::Running => "running",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Exit => "exit",
        }
    }
}

impl FromStr for ResultClass
{
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s {
            "done" => Ok(Self::Done),
            "running" => Ok(Self::Running),
            "connected" => Ok(Self::Connected),
            "error" => Ok(Self::Error),
            "exit" => Ok(Self::Exit),
            other => Err(ProtocolError::UnknownResultClass(other.to_string())),
        }
    }
}

impl fmt::Display for ResultClass
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

/// Which of the three async record flavours a record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncKind
{
    /// `*` - execution state changes (`running`, `stopped`)
    Exec,
    /// `+` - progress of long operations
    Status,
    /// `=` - everything else (thread groups, parameters, libraries)
    Notify,
}

/// Which stream a stream record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind
{
    /// `~` - text GDB would print on its console
    Console,
    /// `@` - output from a remote target
    Target,
    /// `&` - GDB's internal log, including the echo of each command
    Log,
}

/// One line of GDB/MI output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record
{
    /// Command completion.
    Result
    {
        token: Option<u64>,
        class: ResultClass,
        results: Vec<MiResult>,
    },
    /// Asynchronous state change.
    Async
    {
        kind: AsyncKind,
        token: Option<u64>,
        class: String,
        results: Vec<MiResult>,
    },
    /// Free-form text.
    Stream
    {
        kind: StreamKind, text: String
    },
    /// A line that is not MI at all (the inferior writing to the shared terminal).
    Output(String),
    /// The `(gdb)` prompt that terminates each response batch.
    Prompt,
}

impl Record
{
    /// Correlation token, if the record carries one.
    #[must_use]
    pub fn token(&self) -> Option<u64>
    {
        match self {
            Self::Result { token, .. } | Self::Async { token, .. } => *token,
            _ => None,
        }
    }

    /// Look up a top-level result field on a result or async record.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value>
    {
        match self {
            Self::Result { results, .. } | Self::Async { results, .. } => find(results, name),
            _ => None,
        }
    }

    /// Shorthand for `field(name)` followed by [`Value::as_str`].
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str>
    {
        self.field(name).and_then(Value::as_str)
    }
}
