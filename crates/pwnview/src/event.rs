//! Event handling for the front end

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pwnview_core::{SessionEvent, SessionEventReceiver};
use pwnview_utils::warn;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events the input loop reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event
{
    /// A line typed by the user
    Input(String),
    /// Standard input reached EOF
    InputClosed,
    /// Routed output or a state change from the session
    Session(SessionEvent),
}

/// Merges stdin lines and session events into one async stream
pub struct EventHandler
{
    receiver: mpsc::Receiver<Event>,
    should_stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl EventHandler
{
    /// Spawn the stdin reader and the session event forwarder.
    ///
    /// Must be called from inside a Tokio runtime.
    #[must_use]
    pub fn new(session_events: SessionEventReceiver) -> Self
    {
        let (sender, receiver) = mpsc::channel(256);
        let should_stop = Arc::new(AtomicBool::new(false));

        let handles = vec![
            spawn_input_reader(sender.clone()),
            spawn_session_forwarder(session_events, sender, Arc::clone(&should_stop)),
        ];

        Self {
            receiver,
            should_stop,
            handles,
        }
    }

    /// Get the next event (async)
    pub async fn next(&mut self) -> Option<Event>
    {
        self.receiver.recv().await
    }

    /// Stop forwarding session events.
    ///
    /// The stdin reader blocks in `read_line` and only notices on its next
    /// line; the runtime is shut down with a timeout for that reason.
    pub fn stop(&mut self)
    {
        self.should_stop.store(true, Ordering::Relaxed);
        self.receiver.close();
    }

    /// Number of background tasks still running
    #[must_use]
    pub fn running_tasks(&self) -> usize
    {
        self.handles.iter().filter(|handle| !handle.is_finished()).count()
    }
}

impl Drop for EventHandler
{
    fn drop(&mut self)
    {
        self.stop();
    }
}

fn spawn_input_reader(sender: mpsc::Sender<Event>) -> JoinHandle<()>
{
    tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if sender.blocking_send(Event::Input(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!("Failed to read input: {err}");
                    break;
                }
            }
        }
        let _ = sender.blocking_send(Event::InputClosed);
    })
}

fn spawn_session_forwarder(
    receiver: SessionEventReceiver,
    sender: mpsc::Sender<Event>,
    should_stop: Arc<AtomicBool>,
) -> JoinHandle<()>
{
    tokio::task::spawn_blocking(move || {
        while !should_stop.load(Ordering::Relaxed) {
            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => {
                    if sender.blocking_send(Event::Session(event)).is_err() {
                        break;
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}
