//! # Command Dispatcher
//!
//! Turns logical actions into token-tagged command lines and writes them to
//! GDB's input. The dispatcher never waits for a reply: whatever GDB answers is
//! picked up and routed by the [`Demultiplexer`](crate::demux::Demultiplexer)
//! through the token the command was tagged with.
//!
//! ## Refresh cascade
//!
//! Every user command is followed by a refresh of everything the front end
//! shows:
//!
//! ```text
//! 1<user command>
//! 5context regs      6context stack      3context disasm
//! 4context code      7context backtrace
//! 8heap              9bins               11p/x $fs_base
//! 1000hexdump <watch #0> <bytes> ...
//! ```
//!
//! GDB queues the refreshes behind the user command, so if that command
//! resumes the inferior, the refresh output arrives while the inferior is
//! running and is suppressed by the reader.
//!
//! ## Failures
//!
//! A failed write is not returned to the caller. It is logged and reported as
//! text in the main pane, which is where the user looks for command output.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use pwnview_protocol::encode_command;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SessionError};
use crate::events::{SessionEvent, SessionEventSender};
use crate::inferior::InferiorTracker;
use crate::token::{ContextPane, Token, WatchIndex};
use crate::watch::{SharedWatches, Watch};

const HEAP: &str = "heap";
const BINS: &str = "bins";
const FS_BASE: &str = "p/x $fs_base";

fn hexdump(watch: &Watch) -> String
{
    format!("hexdump {} {}", watch.expression, watch.byte_count)
}

/// Destination for encoded command lines (GDB's stdin in production).
pub trait CommandSink: Send
{
    /// Write one complete line, including its trailing newline.
    ///
    /// ## Errors
    ///
    /// Returns the underlying I/O error if the line could not be written.
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

impl<W: Write + Send> CommandSink for W
{
    fn write_line(&mut self, line: &str) -> io::Result<()>
    {
        self.write_all(line.as_bytes())?;
        self.flush()
    }
}

/// Issues commands to GDB on behalf of the front end.
///
/// All methods take `&self`; share the dispatcher behind an `Arc` to call it
/// from several threads. Writes are serialized by an internal lock so lines
/// never interleave.
pub struct Dispatcher
{
    sink: Mutex<Box<dyn CommandSink>>,
    inferior: InferiorTracker,
    watches: SharedWatches,
    events: SessionEventSender,
    default_watch_bytes: usize,
}

impl fmt::Debug for Dispatcher
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Dispatcher")
            .field("inferior", &self.inferior.get())
            .field("watches", &self.watches.lock().len())
            .field("default_watch_bytes", &self.default_watch_bytes)
            .finish_non_exhaustive()
    }
}

impl Dispatcher
{
    /// Create a dispatcher writing to `sink`.
    ///
    /// `events` receives main-pane reports of failed writes.
    pub fn new(
        sink: Box<dyn CommandSink>,
        inferior: InferiorTracker,
        watches: SharedWatches,
        events: SessionEventSender,
        default_watch_bytes: usize,
    ) -> Self
    {
        Self {
            sink: Mutex::new(sink),
            inferior,
            watches,
            events,
            default_watch_bytes,
        }
    }

    /// Encode and write one command. Returns `false` if it was not written.
    fn send(&self, token: Token, text: &str) -> bool
    {
        let line = match encode_command(token.raw(), text).map_err(SessionError::from) {
            Ok(line) => line,
            Err(e) => {
                warn!(%token, command = text, error = %e, "Refusing to send command");
                self.report(&format!("Cannot send '{}': {e}\n", text.escape_debug()));
                return false;
            }
        };

        let result = self.sink.lock().unwrap_or_else(PoisonError::into_inner).write_line(&line);
        match result {
            Ok(()) => {
                trace!(%token, command = text, state = %self.inferior.get(), "Sent command");
                true
            }
            Err(e) => {
                warn!(%token, command = text, error = %e, "Failed to write command to debugger");
                self.report(&format!("Failed to send '{text}' to the debugger: {e}\n"));
                false
            }
        }
    }

    fn report(&self, message: &str)
    {
        let event = SessionEvent::PaneUpdate {
            pane: ContextPane::Main,
            content: message.as_bytes().to_vec(),
        };
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped, failure report lost");
        }
    }

    /// Run a command typed by the user, then refresh every pane.
    pub fn send_user_command(&self, text: &str)
    {
        debug!(command = text, "User command");
        if self.send(Token::UserMain, text) {
            self.refresh_all_contexts();
        }
    }

    /// Re-query every context pane, the heap views, `$fs_base` and all watches.
    ///
    /// Stops at the first command that cannot be written, so a dead pipe is
    /// reported once.
    pub fn refresh_all_contexts(&self)
    {
        let contexts = ContextPane::REFRESHED.map(|pane| (Token::Context(pane), format!("context {}", pane.name())));
        let views = [
            (Token::Heap, HEAP.to_string()),
            (Token::Bins, BINS.to_string()),
            (Token::FsBase, FS_BASE.to_string()),
        ];
        let watches = self.watches.snapshot().into_iter().map(|watch| (watch.token(), hexdump(&watch)));

        for (token, command) in contexts.into_iter().chain(views).chain(watches) {
            if !self.send(token, &command) {
                return;
            }
        }
    }

    /// Run an arbitrary command whose output belongs in the main pane.
    pub fn execute(&self, command: &str)
    {
        self.send(Token::Context(ContextPane::Main), command);
    }

    /// Load an executable. The inferior is `Queued` until the user runs it.
    ///
    /// The executable's directory is added to the source search path so the
    /// code pane can find sources next to the binary.
    pub fn set_file_target(&self, path: &Path)
    {
        info!(path = %path.display(), "Selecting file target");
        self.send(Token::Context(ContextPane::Main), &format!("file {}", path.display()));
        self.inferior.on_file_target();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            self.set_source_dir(parent);
        }
    }

    /// Attach to a running process. Attaching stops it.
    pub fn set_pid_target(&self, pid: u32)
    {
        info!(pid, "Attaching to process");
        self.send(Token::Context(ContextPane::Main), &format!("attach {pid}"));
        self.inferior.on_pid_target();
    }

    /// Add a directory to the source search path.
    pub fn set_source_dir(&self, dir: &Path)
    {
        self.send(Token::Context(ContextPane::Main), &format!("dir {}", dir.display()));
    }

    /// `set <args>`; the (empty) output is discarded.
    pub fn change_setting(&self, args: &str)
    {
        debug!(args, "Changing debugger setting");
        self.send(Token::Discard, &format!("set {args}"));
    }

    /// Change pwndbg's `context-stack-lines` and redraw the stack pane.
    pub fn update_stack_lines(&self, lines: u32)
    {
        self.change_setting(&format!("context-stack-lines {lines}"));
        self.send(Token::Context(ContextPane::Stack), "context stack");
    }

    /// Query the heap summary.
    pub fn heap(&self)
    {
        self.send(Token::Heap, HEAP);
    }

    /// Query the bins summary.
    pub fn bins(&self)
    {
        self.send(Token::Bins, BINS);
    }

    /// Check whether freeing `address` would succeed.
    pub fn try_free(&self, address: &str)
    {
        self.send(Token::TryFree, &format!("try_free {address}"));
    }

    /// Query the `$fs_base` register.
    pub fn fs_base(&self)
    {
        self.send(Token::FsBase, FS_BASE);
    }

    /// List the debugger's commands. Works without a running inferior.
    pub fn request_command_catalog(&self)
    {
        self.send(Token::CommandCatalog, "pwndbg");
    }

    /// Look up what an address points into.
    pub fn lookup_address_info(&self, address: &str)
    {
        self.send(Token::AddressInfo, &format!("xinfo {address}"));
    }

    /// Search memory; results go to the main pane.
    pub fn search(&self, args: &str)
    {
        self.send(Token::Context(ContextPane::Main), &format!("search {args}"));
    }

    fn query_watch(&self, watch: &Watch)
    {
        self.send(watch.token(), &hexdump(watch));
    }

    /// Start watching `expression` with the default byte count and query it once.
    ///
    /// ## Errors
    ///
    /// See [`Dispatcher::add_watch_with_bytes`].
    pub fn add_watch(&self, expression: &str) -> Result<WatchIndex>
    {
        self.add_watch_with_bytes(expression, self.default_watch_bytes)
    }

    /// Start watching `expression` and query it once.
    ///
    /// ## Errors
    ///
    /// - `WatchExists`: already watched; no query is issued
    /// - `EmptyExpression`, `InvalidByteCount`, `WatchRangeExhausted`: rejected by the registry
    pub fn add_watch_with_bytes(&self, expression: &str, byte_count: usize) -> Result<WatchIndex>
    {
        let watch = {
            let mut registry = self.watches.lock();
            let index = registry.add(expression, byte_count)?;
            registry.by_index(index).cloned().ok_or_else(|| SessionError::UnknownWatch(expression.to_string()))?
        };
        debug!(expression = %watch.expression, index = %watch.index, "Added watch");
        self.query_watch(&watch);
        Ok(watch.index)
    }

    /// Stop watching `expression`. Late results for its token are dropped by the reader.
    ///
    /// ## Errors
    ///
    /// Returns `UnknownWatch` if the expression is not watched.
    pub fn delete_watch(&self, expression: &str) -> Result<Watch>
    {
        let watch = self
            .watches
            .lock()
            .remove(expression)
            .ok_or_else(|| SessionError::UnknownWatch(expression.trim().to_string()))?;
        debug!(expression = %watch.expression, index = %watch.index, "Deleted watch");
        Ok(watch)
    }

    /// Change a watch's byte count and query it once at the new size.
    ///
    /// ## Errors
    ///
    /// - `UnknownWatch`: the expression is not watched
    /// - `InvalidByteCount`: `byte_count` is zero
    pub fn set_watch_byte_count(&self, expression: &str, byte_count: usize) -> Result<()>
    {
        let watch = self.watches.lock().set_byte_count(expression, byte_count)?.clone();
        self.query_watch(&watch);
        Ok(())
    }

    /// Replay an init file line by line.
    ///
    /// GDB in MI mode is started with `--nx`, so the user's `.gdbinit` (which
    /// normally loads pwndbg) has to be fed in by hand. Returns the number of
    /// commands sent; a missing file is logged and counts as zero.
    ///
    /// ## Errors
    ///
    /// Returns `Io` if the file exists but cannot be read.
    pub fn load_init_file(&self, path: &Path) -> Result<usize>
    {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Init file not found");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let mut sent = 0;
        let mut loads_pwndbg = false;
        for line in contents.lines().map(str::trim).filter(|line| !line.is_empty()) {
            debug!(command = line, "Replaying init file command");
            if line.contains("source") && line.contains("pwndbg") {
                loads_pwndbg = true;
            }
            self.execute(line);
            sent += 1;
        }

        if !loads_pwndbg {
            warn!(path = %path.display(), "Init file does not source pwndbg; pwndbg commands will fail");
        }
        info!(path = %path.display(), commands = sent, "Replayed init file");
        Ok(sent)
    }

    /// Ask GDB to exit.
    pub fn request_exit(&self)
    {
        self.send(Token::Discard, "-gdb-exit");
    }
}
