//! # Session
//!
//! Owns everything one debugging session needs: the GDB process, the reader
//! thread, and the state both sides share.
//!
//! ```text
//!             ┌────────────┐  token-tagged lines   ┌─────┐
//! front end ─▶│ Dispatcher │ ─────────────────────▶│ GDB │
//!             └────────────┘                       └─────┘
//!                   │ InferiorTracker, SharedWatches   │ MI records
//!                   ▼                                  ▼
//!             ┌───────────────┐   SessionEvent   ┌────────────┐
//! front end ◀─│ event channel │◀─────────────────│   reader   │
//!             └───────────────┘                  └────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use pwnview_core::{Session, SessionConfig};
//!
//! let (mut session, events) = Session::start(SessionConfig::from_env()?)?;
//! session.dispatcher().send_user_command("break main");
//! for event in events.iter().take(3) {
//!     println!("{}", event.describe());
//! }
//! session.shutdown();
//! # Ok::<(), pwnview_core::SessionError>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;

use pwnview_protocol::Record;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::demux::Demultiplexer;
use crate::dispatcher::{CommandSink, Dispatcher};
use crate::error::Result;
use crate::events::{event_channel, SessionEventReceiver};
use crate::inferior::{InferiorState, InferiorTracker};
use crate::transport::GdbProcess;
use crate::watch::{SharedWatches, Watch};

/// A running debugging session.
#[derive(Debug)]
pub struct Session
{
    config: SessionConfig,
    dispatcher: Arc<Dispatcher>,
    inferior: InferiorTracker,
    watches: SharedWatches,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    process: Option<GdbProcess>,
}

impl Session
{
    /// Start GDB, the reader thread, and replay the configured init file.
    ///
    /// ## Errors
    ///
    /// Returns an error if GDB cannot be started or the reader thread cannot
    /// be created. A missing init file only logs a warning.
    pub fn start(config: SessionConfig) -> Result<(Self, SessionEventReceiver)>
    {
        let (process, stdin, records) = GdbProcess::spawn(&config)?;
        let (mut session, events) = Self::with_transport(config, stdin, records)?;
        session.process = Some(process);

        if let Some(init_file) = session.config.init_file.clone() {
            session.dispatcher.load_init_file(&init_file)?;
        }
        Ok((session, events))
    }

    /// Build a session over an existing transport: `sink` receives encoded
    /// command lines, `records` delivers parsed GDB output.
    ///
    /// No process is owned and no init file is replayed.
    ///
    /// ## Errors
    ///
    /// Returns `Io` if the reader thread cannot be created.
    pub fn with_transport<S>(config: SessionConfig, sink: S, records: Receiver<Record>) -> Result<(Self, SessionEventReceiver)>
    where
        S: CommandSink + 'static,
    {
        let (events_tx, events_rx) = event_channel();
        let inferior = InferiorTracker::new();
        let watches = SharedWatches::new();
        let stop = Arc::new(AtomicBool::new(false));

        let dispatcher = Arc::new(Dispatcher::new(
            Box::new(sink),
            inferior.clone(),
            watches.clone(),
            events_tx.clone(),
            config.default_watch_bytes,
        ));
        let demux = Demultiplexer::new(&config, inferior.clone(), watches.clone(), events_tx);
        let reader = demux.spawn(records, Arc::clone(&stop), config.poll_interval)?;

        info!("Session started");
        Ok((
            Self {
                config,
                dispatcher,
                inferior,
                watches,
                stop,
                reader: Some(reader),
                process: None,
            },
            events_rx,
        ))
    }

    /// Control interface. Clone the `Arc` to issue commands from another thread.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher>
    {
        &self.dispatcher
    }

    /// Current inferior state.
    #[must_use]
    pub fn inferior_state(&self) -> InferiorState
    {
        self.inferior.get()
    }

    /// Active watches, ordered by index.
    #[must_use]
    pub fn watches(&self) -> Vec<Watch>
    {
        self.watches.snapshot()
    }

    /// Configuration the session was started with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig
    {
        &self.config
    }

    /// Whether the reader is still consuming GDB output. Turns `false` when
    /// GDB exits or after [`Session::shutdown`].
    #[must_use]
    pub fn is_running(&self) -> bool
    {
        self.reader.as_ref().is_some_and(|reader| !reader.is_finished())
    }

    /// Whether [`Session::shutdown`] has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool
    {
        self.stop.load(Ordering::Acquire)
    }

    /// Stop the reader, ask GDB to exit and reap it. Idempotent.
    ///
    /// Output that was still being collected is discarded.
    pub fn shutdown(&mut self)
    {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down session");

        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Reader thread panicked");
            }
        }
        self.dispatcher.request_exit();
        if let Some(process) = self.process.take() {
            process.terminate();
        }
    }
}

impl Drop for Session
{
    fn drop(&mut self)
    {
        self.shutdown();
    }
}
