//! Common module for library exports

pub use crate::config::{SessionConfig, StopFlushPolicy};
pub use crate::dispatcher::Dispatcher;
pub use crate::error::{Result, SessionError};
pub use crate::events::SessionEvent;
pub use crate::inferior::InferiorState;
pub use crate::session::Session;
pub use crate::token::{ContextPane, Token, WatchIndex};
pub use crate::watch::Watch;
