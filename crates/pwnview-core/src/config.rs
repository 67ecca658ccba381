//! # Session Configuration
//!
//! Settings for starting GDB and tuning the reader.
//!
//! ## Sources
//!
//! Values are layered, later sources win:
//!
//! 1. Built-in defaults ([`SessionConfig::default`])
//! 2. `PWNVIEW_*` environment variables ([`SessionConfig::from_env`])
//! 3. Command-line flags (applied by the binary)
//!
//! ## Environment Variables
//!
//! - `PWNVIEW_GDB`: debugger executable (default: `gdb`)
//! - `PWNVIEW_GDBINIT`: init file replayed after start-up (default: `~/.gdbinit`)
//! - `PWNVIEW_POLL_MS`: reader poll interval in milliseconds (default: `100`)
//! - `PWNVIEW_WATCH_BYTES`: hexdump size for new watches (default: `64`)

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SessionError};

/// Default debugger executable.
pub const DEFAULT_GDB: &str = "gdb";
/// Default hexdump size for new watches.
pub const DEFAULT_WATCH_BYTES: usize = 64;
/// Default reader poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// When a `*stopped` record flushes the main buffer.
///
/// Breakpoint hits and finished steps produce no result record, so output
/// collected before them would otherwise wait for the next unrelated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopFlushPolicy
{
    /// Flush on every stop record that carries a reason
    #[default]
    AnyReason,
    /// Flush only on `breakpoint-hit`, `end-stepping-range` and `exited`
    ListedReasons,
}

impl StopFlushPolicy
{
    /// Stop reasons flushed under [`StopFlushPolicy::ListedReasons`].
    pub const LISTED: [&'static str; 3] = ["breakpoint-hit", "end-stepping-range", "exited"];

    /// Whether a stop with this reason flushes the main buffer.
    #[must_use]
    pub fn flushes(self, reason: &str) -> bool
    {
        match self {
            Self::AnyReason => true,
            Self::ListedReasons => Self::LISTED.contains(&reason),
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig
{
    /// Debugger executable
    pub gdb_path: PathBuf,
    /// Arguments passed to the debugger; must select an MI interpreter
    pub gdb_args: Vec<String>,
    /// Init file replayed after start-up (`None` disables it)
    pub init_file: Option<PathBuf>,
    /// Bounded wait of one reader poll
    pub poll_interval: Duration,
    /// Hexdump size for new watches
    pub default_watch_bytes: usize,
    /// Leading log lines skipped in the main/context error fallback (the echoed command)
    pub log_skip: usize,
    /// Leading log lines skipped in the watch error fallback
    pub watch_log_skip: usize,
    /// Which stop records flush the main buffer
    pub stop_flush: StopFlushPolicy,
}

impl Default for SessionConfig
{
    fn default() -> Self
    {
        Self {
            gdb_path: PathBuf::from(DEFAULT_GDB),
            gdb_args: ["--nx", "--quiet", "--interpreter=mi3"].map(String::from).to_vec(),
            init_file: default_init_file(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_watch_bytes: DEFAULT_WATCH_BYTES,
            log_skip: 1,
            watch_log_skip: 1,
            stop_flush: StopFlushPolicy::default(),
        }
    }
}

/// `~/.gdbinit`, if `HOME` is set.
fn default_init_file() -> Option<PathBuf>
{
    env::var("HOME").ok().map(|home| PathBuf::from(home).join(".gdbinit"))
}

impl SessionConfig
{
    /// Defaults overridden by `PWNVIEW_*` environment variables.
    ///
    /// ## Errors
    ///
    /// Returns [`SessionError::Config`] if a numeric variable does not parse
    /// or is zero.
    pub fn from_env() -> Result<Self>
    {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides read through `lookup` (a stand-in for `env::var`).
    ///
    /// ## Errors
    ///
    /// Returns [`SessionError::Config`] if a numeric variable does not parse
    /// or is zero.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(gdb) = lookup("PWNVIEW_GDB").filter(|value| !value.trim().is_empty()) {
            self.gdb_path = PathBuf::from(gdb.trim());
        }
        if let Some(init) = lookup("PWNVIEW_GDBINIT") {
            let init = init.trim();
            self.init_file = if init.is_empty() { None } else { Some(PathBuf::from(init)) };
        }
        if let Some(poll) = lookup("PWNVIEW_POLL_MS") {
            self.poll_interval = Duration::from_millis(parse_positive("PWNVIEW_POLL_MS", &poll)?);
        }
        if let Some(bytes) = lookup("PWNVIEW_WATCH_BYTES") {
            self.default_watch_bytes = parse_positive("PWNVIEW_WATCH_BYTES", &bytes)?;
        }
        Ok(())
    }
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr + Default + PartialEq,
    T::Err: fmt::Display,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed == T::default() => Err(SessionError::Config(format!("{key} must be greater than zero"))),
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(SessionError::Config(format!("{key}='{value}': {e}"))),
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String>
    {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults()
    {
        let config = SessionConfig::default();
        assert_eq!(config.gdb_path, PathBuf::from("gdb"));
        assert!(config.gdb_args.iter().any(|arg| arg == "--interpreter=mi3"));
        assert!(config.gdb_args.iter().any(|arg| arg == "--nx"));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.default_watch_bytes, 64);
        assert_eq!(config.log_skip, 1);
        assert_eq!(config.stop_flush, StopFlushPolicy::AnyReason);
    }

    #[test]
    fn test_env_overrides()
    {
        let mut config = SessionConfig::default();
        config
            .apply_env(lookup_from(&[
                ("PWNVIEW_GDB", "/opt/gdb/bin/gdb"),
                ("PWNVIEW_GDBINIT", "/tmp/init"),
                ("PWNVIEW_POLL_MS", "25"),
                ("PWNVIEW_WATCH_BYTES", " 128 "),
            ]))
            .unwrap();
        assert_eq!(config.gdb_path, PathBuf::from("/opt/gdb/bin/gdb"));
        assert_eq!(config.init_file, Some(PathBuf::from("/tmp/init")));
        assert_eq!(config.poll_interval, Duration::from_millis(25));
        assert_eq!(config.default_watch_bytes, 128);
    }

    #[test]
    fn test_empty_gdbinit_disables_replay()
    {
        let mut config = SessionConfig::default();
        config.apply_env(lookup_from(&[("PWNVIEW_GDBINIT", "")])).unwrap();
        assert_eq!(config.init_file, None);
    }

    #[test]
    fn test_invalid_numbers_rejected()
    {
        let mut config = SessionConfig::default();
        let result = config.apply_env(lookup_from(&[("PWNVIEW_POLL_MS", "fast")]));
        assert!(matches!(result, Err(SessionError::Config(msg)) if msg.contains("PWNVIEW_POLL_MS")));

        let result = config.apply_env(lookup_from(&[("PWNVIEW_WATCH_BYTES", "0")]));
        assert!(matches!(result, Err(SessionError::Config(_))));
        assert_eq!(config.default_watch_bytes, DEFAULT_WATCH_BYTES);
    }

    #[test]
    fn test_stop_flush_policy()
    {
        assert!(StopFlushPolicy::AnyReason.flushes("signal-received"));
        assert!(StopFlushPolicy::ListedReasons.flushes("breakpoint-hit"));
        assert!(StopFlushPolicy::ListedReasons.flushes("exited"));
        assert!(!StopFlushPolicy::ListedReasons.flushes("signal-received"));
    }
}
