//! # Inferior State Machine
//!
//! Run status of the debuggee, shared by the dispatcher and the reader.
//!
//! ```text
//! QUEUED -> RUNNING -> STOPPED -> (RUNNING <-> STOPPED)* -> EXITED
//!    ^                                                        |
//!    +------------------- new file target --------------------+
//! ```
//!
//! The reader moves the state in response to GDB's asynchronous records; the
//! dispatcher only resets it when a new target is selected. The state is a
//! single atomic byte, so both sides can read it without locking.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Run status of the inferior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InferiorState
{
    /// A program is loaded but not started
    Queued = 0,
    /// Executing; GDB queues further commands until it stops
    Running = 1,
    /// Stopped (breakpoint, step, signal, attach)
    Stopped = 2,
    /// Process is gone; only a new target leaves this state
    Exited = 3,
}

impl InferiorState
{
    const fn from_u8(value: u8) -> Self
    {
        match value {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Stopped,
            _ => Self::Exited,
        }
    }
}

impl fmt::Display for InferiorState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// Shared handle to the inferior state (cheap to clone).
#[derive(Debug, Clone)]
pub struct InferiorTracker(Arc<AtomicU8>);

impl Default for InferiorTracker
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl InferiorTracker
{
    /// New tracker in the `Queued` state.
    #[must_use]
    pub fn new() -> Self
    {
        Self(Arc::new(AtomicU8::new(InferiorState::Queued as u8)))
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> InferiorState
    {
        InferiorState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Whether the inferior is stopped, i.e. frame/register/memory queries are meaningful.
    #[must_use]
    pub fn is_stopped(&self) -> bool
    {
        self.get() == InferiorState::Stopped
    }

    fn set(&self, state: InferiorState) -> InferiorState
    {
        let previous = InferiorState::from_u8(self.0.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            debug!(from = %previous, to = %state, "Inferior state changed");
        }
        previous
    }

    /// `*running`: the inferior resumed.
    pub fn on_running(&self) -> InferiorState
    {
        self.set(InferiorState::Running)
    }

    /// `*stopped`: the inferior stopped, unless it already exited.
    ///
    /// Returns `true` if the state is now `Stopped`. A stray stop record after
    /// `=thread-group-exited` leaves `Exited` in place and returns `false`.
    pub fn on_stopped(&self) -> bool
    {
        let result = self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            if current == InferiorState::Exited as u8 {
                None
            } else {
                Some(InferiorState::Stopped as u8)
            }
        });
        match result {
            Ok(previous) => {
                let previous = InferiorState::from_u8(previous);
                if previous != InferiorState::Stopped {
                    debug!(from = %previous, to = %InferiorState::Stopped, "Inferior state changed");
                }
                true
            }
            Err(_) => {
                debug!("Ignoring stop record for an exited inferior");
                false
            }
        }
    }

    /// `=thread-group-exited`: the process is gone.
    pub fn on_exited(&self) -> InferiorState
    {
        self.set(InferiorState::Exited)
    }

    /// `=thread-group-started`: a process started or was re-attached.
    ///
    /// A second attach produces no `*running` record, so this is the only
    /// signal that the exited state is over.
    pub fn on_started(&self) -> InferiorState
    {
        self.set(InferiorState::Running)
    }

    /// A new executable was selected; nothing runs until the user starts it.
    pub fn on_file_target(&self) -> InferiorState
    {
        self.set(InferiorState::Queued)
    }

    /// Attached to a process by PID. Attaching always stops the target.
    pub fn on_pid_target(&self) -> InferiorState
    {
        self.set(InferiorState::Stopped)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_starts_queued()
    {
        let tracker = InferiorTracker::new();
        assert_eq!(tracker.get(), InferiorState::Queued);
        assert!(!tracker.is_stopped());
    }

    #[test]
    fn test_run_stop_cycle()
    {
        let tracker = InferiorTracker::new();
        assert_eq!(tracker.on_running(), InferiorState::Queued);
        assert!(tracker.on_stopped());
        assert!(tracker.is_stopped());
        assert_eq!(tracker.on_running(), InferiorState::Stopped);
        assert_eq!(tracker.get(), InferiorState::Running);
    }

    #[test]
    fn test_exited_survives_stray_stop()
    {
        let tracker = InferiorTracker::new();
        tracker.on_running();
        tracker.on_exited();
        assert!(!tracker.on_stopped());
        assert_eq!(tracker.get(), InferiorState::Exited);
    }

    #[test]
    fn test_new_target_leaves_exited()
    {
        let tracker = InferiorTracker::new();
        tracker.on_exited();
        tracker.on_file_target();
        assert_eq!(tracker.get(), InferiorState::Queued);

        tracker.on_exited();
        tracker.on_started();
        assert_eq!(tracker.get(), InferiorState::Running);

        tracker.on_exited();
        tracker.on_pid_target();
        assert!(tracker.is_stopped());
    }

    #[test]
    fn test_clones_share_state()
    {
        let tracker = InferiorTracker::new();
        let reader_side = tracker.clone();
        reader_side.on_running();
        assert_eq!(tracker.get(), InferiorState::Running);
    }
}
