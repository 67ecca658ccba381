//! # pwnview-core
//!
//! Session multiplexer between a GDB/pwndbg process and a multi-pane front end.
//!
//! GDB's machine interface is a single interleaved stream: command output,
//! state changes and the debuggee's own output all arrive on one pipe. This
//! crate tags every outbound command with a correlation [`Token`], collects
//! inbound text until the matching result record arrives, and delivers it as a
//! finished [`SessionEvent`] for the pane, view or watch that asked for it.
//!
//! ## Components
//!
//! - [`token`]: the fixed token space and the open-ended watch range
//! - [`watch`]: expression to watch-index registry
//! - [`inferior`]: run state of the debuggee, which gates what is shown
//! - [`dispatcher`]: writes commands, never waits for replies
//! - [`demux`]: the reader that classifies, buffers and routes records
//! - [`transport`]: spawns GDB and parses its output
//! - [`session`]: ties the pieces together
//!
//! Nothing here is fatal at runtime: a protocol anomaly costs at most a
//! dropped or misrouted update.

pub mod config;
pub mod demux;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod inferior;
pub mod prelude;
pub mod session;
pub mod token;
pub mod transport;
pub mod watch;

pub use config::{SessionConfig, StopFlushPolicy};
pub use dispatcher::{CommandSink, Dispatcher};
// Re-export commonly used types
pub use error::{Result, SessionError};
pub use events::{SessionEvent, SessionEventReceiver, SessionEventSender};
pub use inferior::InferiorState;
pub use session::Session;
pub use token::{ContextPane, Token, WatchIndex};
pub use watch::Watch;
