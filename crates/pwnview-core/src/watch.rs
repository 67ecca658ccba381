//! # Watch Registry
//!
//! Bookkeeping for user-defined memory watches.
//!
//! Each watch maps an address or expression (as typed by the user) to a
//! [`WatchIndex`] inside the watch token range, plus the number of bytes the
//! hexdump should cover. The dispatcher consults the registry to know which
//! hexdumps to refresh; the reader consults it to turn a watch token back into
//! the expression it belongs to. Only the dispatcher mutates it.
//!
//! Indexes are allocated lowest-free-first, so an index is reused as soon as
//! its watch has been removed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, SessionError};
use crate::token::{Token, WatchIndex};

/// An active watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch
{
    /// Address or expression as entered by the user
    pub expression: String,
    /// Position in the watch token range
    pub index: WatchIndex,
    /// Number of bytes to hexdump
    pub byte_count: usize,
}

impl Watch
{
    /// Correlation token used for this watch's hexdumps.
    #[must_use]
    pub const fn token(&self) -> Token
    {
        Token::Watch(self.index)
    }
}

/// Registry of active watches (wrap in [`SharedWatches`] to share it).
#[derive(Debug, Default)]
pub struct WatchRegistry
{
    by_index: BTreeMap<WatchIndex, Watch>,
    by_expression: HashMap<String, WatchIndex>,
}

impl WatchRegistry
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    fn allocate_index(&self) -> Result<WatchIndex>
    {
        (0..=u32::MAX)
            .map(WatchIndex::from_raw)
            .find(|index| !self.by_index.contains_key(index))
            .ok_or(SessionError::WatchRangeExhausted)
    }

    /// Start tracking `expression`.
    ///
    /// Surrounding whitespace is ignored, so `" 0x1000"` and `"0x1000"` name
    /// the same watch.
    ///
    /// ## Errors
    ///
    /// - `EmptyExpression`: nothing left after trimming
    /// - `WatchExists`: the expression is already watched; the existing watch is untouched
    /// - `InvalidByteCount`: `byte_count` is zero
    pub fn add(&mut self, expression: &str, byte_count: usize) -> Result<WatchIndex>
    {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(SessionError::EmptyExpression);
        }
        if byte_count == 0 {
            return Err(SessionError::InvalidByteCount(byte_count));
        }
        if self.by_expression.contains_key(expression) {
            return Err(SessionError::WatchExists(expression.to_string()));
        }

        let index = self.allocate_index()?;
        self.by_expression.insert(expression.to_string(), index);
        self.by_index.insert(
            index,
            Watch {
                expression: expression.to_string(),
                index,
                byte_count,
            },
        );
        Ok(index)
    }

    /// Stop tracking `expression`, freeing its index.
    pub fn remove(&mut self, expression: &str) -> Option<Watch>
    {
        let index = self.by_expression.remove(expression.trim())?;
        self.by_index.remove(&index)
    }

    /// Change how many bytes the watch covers and return the updated watch.
    ///
    /// ## Errors
    ///
    /// - `InvalidByteCount`: `byte_count` is zero
    /// - `UnknownWatch`: the expression is not watched
    pub fn set_byte_count(&mut self, expression: &str, byte_count: usize) -> Result<&Watch>
    {
        if byte_count == 0 {
            return Err(SessionError::InvalidByteCount(byte_count));
        }
        let expression = expression.trim();
        let index = *self
            .by_expression
            .get(expression)
            .ok_or_else(|| SessionError::UnknownWatch(expression.to_string()))?;
        let watch = self
            .by_index
            .get_mut(&index)
            .ok_or_else(|| SessionError::UnknownWatch(expression.to_string()))?;
        watch.byte_count = byte_count;
        Ok(&*watch)
    }

    /// Look up a watch by expression.
    #[must_use]
    pub fn get(&self, expression: &str) -> Option<&Watch>
    {
        let index = self.by_expression.get(expression.trim())?;
        self.by_index.get(index)
    }

    /// Look up the watch that owns a token index.
    #[must_use]
    pub fn by_index(&self, index: WatchIndex) -> Option<&Watch>
    {
        self.by_index.get(&index)
    }

    /// All active watches, ordered by index.
    pub fn iter(&self) -> impl Iterator<Item = &Watch>
    {
        self.by_index.values()
    }

    /// Number of active watches.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.by_index.len()
    }

    /// Whether no watch is active.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.by_index.is_empty()
    }
}

/// Registry handle shared between the dispatcher and the reader thread.
#[derive(Debug, Clone, Default)]
pub struct SharedWatches(Arc<Mutex<WatchRegistry>>);

impl SharedWatches
{
    /// Create a handle to a new, empty registry.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Lock the registry.
    ///
    /// A panic while holding the lock cannot leave the maps half-updated in a
    /// way that matters for routing, so a poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, WatchRegistry>
    {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every active watch, ordered by index.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Watch>
    {
        self.lock().iter().cloned().collect()
    }
}
