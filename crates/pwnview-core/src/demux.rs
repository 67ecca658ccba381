//! # Response Demultiplexer
//!
//! The reader side of a session. GDB answers every command with some stream
//! records followed by one result record carrying the command's token, but
//! asynchronous records (state changes, breakpoint stops) and the debuggee's
//! own output can arrive in between. The demultiplexer collects text until a
//! result record says where it belongs, then hands the finished payload to the
//! consumer the token names.
//!
//! ## Buffers
//!
//! Two pending buffers exist at any time:
//!
//! - **console**: `~` and `@` stream text, the debuggee's raw output and error
//!   messages of failed commands
//! - **log**: `&` stream text; GDB echoes every command here first, so the
//!   leading entry is skipped when the log stands in for missing console output
//!
//! Commands are not pipelined from the reader's point of view, so one pair of
//! buffers is enough. Both are cleared after every result record and on every
//! main-pane flush.
//!
//! ## Gating
//!
//! Output for context panes, single-purpose views and watches is only
//! forwarded while the inferior is stopped. Queries that GDB ran while the
//! target was executing produce errors or stale data. The main pane and the
//! command catalog are never gated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pwnview_protocol::record::find;
use pwnview_protocol::{AsyncKind, Record, ResultClass, StreamKind, Value};
use tracing::{debug, info, trace};

use crate::config::{SessionConfig, StopFlushPolicy};
use crate::events::{SessionEvent, SessionEventSender};
use crate::inferior::InferiorTracker;
use crate::token::{ContextPane, Token, WatchIndex};
use crate::watch::SharedWatches;

/// Console text GDB prints when a forked child is detached. No result record
/// follows it.
const DETACH_MARKER: &str = "Detaching after";

/// Routes inbound records to session events.
#[derive(Debug)]
pub struct Demultiplexer
{
    console: Vec<String>,
    log: Vec<String>,
    inferior: InferiorTracker,
    watches: SharedWatches,
    events: SessionEventSender,
    log_skip: usize,
    watch_log_skip: usize,
    stop_flush: StopFlushPolicy,
}

impl Demultiplexer
{
    /// Create a demultiplexer reading shared state and publishing to `events`.
    #[must_use]
    pub fn new(config: &SessionConfig, inferior: InferiorTracker, watches: SharedWatches, events: SessionEventSender) -> Self
    {
        Self {
            console: Vec::new(),
            log: Vec::new(),
            inferior,
            watches,
            events,
            log_skip: config.log_skip,
            watch_log_skip: config.watch_log_skip,
            stop_flush: config.stop_flush,
        }
    }

    /// Process one inbound record.
    pub fn handle(&mut self, record: Record)
    {
        trace!(?record, "Inbound record");
        match record {
            Record::Stream { kind: StreamKind::Console | StreamKind::Target, text } => {
                let detached = text.contains(DETACH_MARKER);
                self.console.push(text);
                if detached {
                    self.flush_main();
                }
            }
            Record::Stream { kind: StreamKind::Log, text } => self.log.push(text),
            Record::Output(mut line) => {
                line.push('\n');
                self.console.push(line);
            }
            Record::Async { kind, class, results, .. } => self.handle_async(kind, &class, &results),
            Record::Result { token, class, results } => {
                self.handle_result(token, class, &results);
                self.console.clear();
                self.log.clear();
            }
            Record::Prompt => {}
        }
    }

    fn handle_async(&mut self, kind: AsyncKind, class: &str, results: &[(String, Value)])
    {
        match (kind, class) {
            (AsyncKind::Exec, "running") => {
                self.inferior.on_running();
                self.flush_main();
                self.emit(SessionEvent::InferiorStateChanged { stopped: false });
            }
            (AsyncKind::Exec, "stopped") => {
                if self.inferior.on_stopped() {
                    self.emit(SessionEvent::InferiorStateChanged { stopped: true });
                }
                let reason = find(results, "reason").and_then(Value::as_str);
                if let Some(reason) = reason {
                    debug!(reason, "Inferior stopped");
                    if self.stop_flush.flushes(reason) {
                        self.flush_main();
                    }
                }
            }
            (AsyncKind::Notify, "thread-group-exited") => {
                self.inferior.on_exited();
            }
            (AsyncKind::Notify, "thread-group-started") => {
                self.inferior.on_started();
            }
            (AsyncKind::Notify, "cmd-param-changed") => self.handle_param_changed(results),
            _ => trace!(?kind, class, "Ignoring async record"),
        }
    }

    fn handle_param_changed(&self, results: &[(String, Value)])
    {
        let field = |name: &str| find(results, name).and_then(Value::as_str);
        if field("param") != Some("context-stack-lines") {
            return;
        }
        match field("value").map(|value| value.trim().parse::<u32>()) {
            Some(Ok(lines)) => self.emit(SessionEvent::StackLinesChanged(lines)),
            other => debug!(?other, "Unparseable context-stack-lines value"),
        }
    }

    fn handle_result(&mut self, token: Option<u64>, class: ResultClass, results: &[(String, Value)])
    {
        let Some(raw) = token else {
            trace!(%class, "Dropping output of untagged command");
            return;
        };

        if class == ResultClass::Error {
            if let Some(msg) = find(results, "msg").and_then(Value::as_str) {
                self.console.push(msg.to_string());
            }
        }

        let Some(token) = Token::from_raw(raw) else {
            debug!(token = raw, "Dropping output for unknown token");
            return;
        };

        match token {
            Token::Discard => {}
            Token::UserMain => self.route_pane(ContextPane::Main),
            Token::Context(pane) => self.route_pane(pane),
            Token::Heap => self.route_gated(token, SessionEvent::Heap),
            Token::Bins => self.route_gated(token, SessionEvent::Bins),
            Token::TryFree => self.route_gated(token, SessionEvent::TryFree),
            Token::FsBase => self.route_gated(token, SessionEvent::FsBase),
            Token::AddressInfo => self.route_gated(token, SessionEvent::AddressInfo),
            Token::CommandCatalog => {
                let content = self.console_bytes();
                self.emit(SessionEvent::CommandCatalog(content));
            }
            Token::Watch(index) => self.route_watch(index),
        }
    }

    /// Single-purpose views: console content, only while stopped.
    fn route_gated(&self, token: Token, event: fn(Vec<u8>) -> SessionEvent)
    {
        if self.inferior.is_stopped() {
            self.emit(event(self.console_bytes()));
        } else {
            debug!(%token, state = %self.inferior.get(), "Suppressing output while not stopped");
        }
    }

    fn route_pane(&self, pane: ContextPane)
    {
        if pane != ContextPane::Main && !self.inferior.is_stopped() {
            debug!(%pane, state = %self.inferior.get(), "Suppressing context output while not stopped");
            return;
        }
        let content = self.content_with_fallback(self.log_skip);
        if content.is_empty() {
            return;
        }
        debug!(%pane, bytes = content.len(), "Routing pane update");
        self.emit(SessionEvent::PaneUpdate { pane, content });
    }

    fn route_watch(&self, index: WatchIndex)
    {
        let Some(expression) = self.watches.lock().by_index(index).map(|watch| watch.expression.clone()) else {
            debug!(%index, "Dropping output for deleted watch");
            return;
        };
        if !self.inferior.is_stopped() {
            debug!(%index, state = %self.inferior.get(), "Suppressing watch output while not stopped");
            return;
        }
        let content = self.content_with_fallback(self.watch_log_skip);
        self.emit(SessionEvent::WatchResult { index, expression, content });
    }

    /// Flush collected console output to the main pane outside of a result
    /// record. Both buffers are cleared; the log is never shown here.
    fn flush_main(&mut self)
    {
        self.log.clear();
        if self.console.is_empty() {
            return;
        }
        let content = self.console_bytes();
        self.console.clear();
        debug!(bytes = content.len(), "Flushing main pane");
        self.emit(SessionEvent::PaneUpdate { pane: ContextPane::Main, content });
    }

    fn console_bytes(&self) -> Vec<u8>
    {
        self.console.concat().into_bytes()
    }

    /// Console content, or the log minus its first `skip` entries if the console is empty.
    fn content_with_fallback(&self, skip: usize) -> Vec<u8>
    {
        if self.console.is_empty() {
            self.log.iter().skip(skip).map(String::as_str).collect::<String>().into_bytes()
        } else {
            self.console_bytes()
        }
    }

    fn emit(&self, event: SessionEvent)
    {
        if self.events.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }

    /// Consume records until `stop` is set or the inbound channel closes.
    ///
    /// Each iteration waits at most `poll` for a record, so a stop request is
    /// observed within one poll interval. Partially collected output is
    /// discarded on exit.
    pub fn run(mut self, inbound: &Receiver<Record>, stop: &AtomicBool, poll: Duration)
    {
        info!("Reader started");
        while !stop.load(Ordering::Acquire) {
            match inbound.recv_timeout(poll) {
                Ok(record) => self.handle(record),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Debugger output closed");
                    break;
                }
            }
            thread::yield_now();
        }
        info!("Reader stopped");
    }

    /// Spawn [`Demultiplexer::run`] on a named thread.
    ///
    /// ## Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    pub fn spawn(self, inbound: Receiver<Record>, stop: Arc<AtomicBool>, poll: Duration) -> std::io::Result<thread::JoinHandle<()>>
    {
        thread::Builder::new()
            .name("pwnview-reader".to_string())
            .spawn(move || self.run(&inbound, &stop, poll))
    }
}
