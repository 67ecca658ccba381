//! # GDB Transport
//!
//! Spawns GDB with an MI interpreter and turns its stdout into a channel of
//! parsed [`Record`]s.
//!
//! Two pump threads run per process:
//!
//! - **stdout**: reads lines, parses them and forwards the records. Tagged
//!   MI lines that do not parse are logged and dropped; untagged lines that
//!   do not parse are the inferior's own output and are forwarded as such.
//! - **stderr**: GDB's own diagnostics, forwarded to the log.
//!
//! The channel closes when GDB closes its stdout, which the reader treats as
//! end of session.

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pwnview_protocol::{parse_line, Record};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

/// How long to wait for GDB to exit on its own before killing it.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// A running GDB process.
#[derive(Debug)]
pub struct GdbProcess
{
    child: Child,
    pumps: Vec<JoinHandle<()>>,
}

impl GdbProcess
{
    /// Start GDB as configured.
    ///
    /// Returns the process handle, its stdin (the command sink) and the
    /// channel of parsed stdout records.
    ///
    /// ## Errors
    ///
    /// - `Spawn`: the executable could not be started
    /// - `ChannelClosed`: a standard stream was not captured
    /// - `Io`: a pump thread could not be created
    pub fn spawn(config: &SessionConfig) -> Result<(Self, ChildStdin, Receiver<Record>)>
    {
        let program = config.gdb_path.display().to_string();
        info!(program = %program, args = ?config.gdb_args, "Starting debugger");

        let mut child = Command::new(&config.gdb_path)
            .args(&config.gdb_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SessionError::Spawn { program, source })?;

        let stdin = child.stdin.take().ok_or(SessionError::ChannelClosed)?;
        let stdout = child.stdout.take().ok_or(SessionError::ChannelClosed)?;
        let stderr = child.stderr.take().ok_or(SessionError::ChannelClosed)?;

        let (tx, rx) = mpsc::channel();
        let stdout_pump = thread::Builder::new()
            .name("pwnview-gdb-stdout".to_string())
            .spawn(move || pump_records(BufReader::new(stdout), &tx))?;
        let stderr_pump = thread::Builder::new()
            .name("pwnview-gdb-stderr".to_string())
            .spawn(move || pump_stderr(BufReader::new(stderr)))?;

        debug!(pid = child.id(), "Debugger started");
        Ok((
            Self {
                child,
                pumps: vec![stdout_pump, stderr_pump],
            },
            stdin,
            rx,
        ))
    }

    /// OS process id of GDB.
    #[must_use]
    pub fn id(&self) -> u32
    {
        self.child.id()
    }

    /// Wait briefly for GDB to exit, kill it if it does not, and join the pumps.
    ///
    /// Call after asking GDB to exit; closing its stdin has the same effect.
    pub fn terminate(mut self)
    {
        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    info!(%status, "Debugger exited");
                    break;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                Ok(None) => {
                    warn!(pid = self.child.id(), "Debugger did not exit, killing it");
                    if let Err(e) = self.child.kill() {
                        warn!(error = %e, "Failed to kill debugger");
                    }
                    let _ = self.child.wait();
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to query debugger status");
                    break;
                }
            }
        }

        for pump in self.pumps.drain(..) {
            if pump.join().is_err() {
                warn!("Debugger output pump panicked");
            }
        }
    }
}

/// Read one line as raw bytes; GDB passes the debuggee's output through
/// unchanged, so it is not necessarily UTF-8.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Option<String>
{
    buf.clear();
    match reader.read_until(b'\n', buf) {
        Ok(0) => None,
        Ok(_) => Some(String::from_utf8_lossy(buf).into_owned()),
        Err(e) => {
            warn!(error = %e, "Failed to read debugger output");
            None
        }
    }
}

/// Parse every line of `reader` and forward the records until EOF or until
/// the receiving side hangs up.
pub fn pump_records<R: BufRead>(mut reader: R, records: &Sender<Record>)
{
    let mut buf = Vec::new();
    while let Some(line) = read_line(&mut reader, &mut buf) {
        match parse_line(&line) {
            Ok(Some(record)) => {
                if records.send(record).is_err() {
                    debug!("Reader gone, stopping output pump");
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => debug!(line = line.trim_end(), error = %e, "Dropping malformed MI line"),
        }
    }
    debug!("Debugger stdout closed");
}

fn pump_stderr<R: BufRead>(mut reader: R)
{
    let mut buf = Vec::new();
    while let Some(line) = read_line(&mut reader, &mut buf) {
        let line = line.trim_end();
        if !line.is_empty() {
            warn!(target: "gdb", "{line}");
        }
    }
}

#[cfg(test)]
mod tests
{
    use std::io::Cursor;

    use pwnview_protocol::{ResultClass, StreamKind};

    use super::*;

    #[test]
    fn test_pump_parses_and_drops_malformed_lines()
    {
        let output = "=thread-group-added,id=\"i1\"\n\
                      ~\"GNU gdb 14.2\\n\"\n\
                      5^done,broken=\"unterminated\n\
                      \n\
                      (gdb) \n\
                      5^done\n";
        let (tx, rx) = mpsc::channel();
        pump_records(Cursor::new(output.as_bytes()), &tx);
        drop(tx);

        let records: Vec<Record> = rx.iter().collect();
        assert_eq!(records.len(), 4);
        assert!(matches!(&records[1], Record::Stream { kind: StreamKind::Console, text } if text == "GNU gdb 14.2\n"));
        assert_eq!(records[2], Record::Prompt);
        assert!(matches!(records[3], Record::Result { token: Some(5), class: ResultClass::Done, .. }));
    }

    #[test]
    fn test_pump_keeps_inferior_lines_that_look_like_mi()
    {
        let output = "*** stack smashing detected ***: terminated\n\
                      ===== MENU =====\n\
                      +----+\n\
                      plain line\n";
        let (tx, rx) = mpsc::channel();
        pump_records(Cursor::new(output.as_bytes()), &tx);
        drop(tx);

        let records: Vec<Record> = rx.iter().collect();
        assert_eq!(
            records,
            [
                Record::Output("*** stack smashing detected ***: terminated".to_string()),
                Record::Output("===== MENU =====".to_string()),
                Record::Output("+----+".to_string()),
                Record::Output("plain line".to_string()),
            ]
        );
    }

    #[test]
    fn test_pump_keeps_non_utf8_output()
    {
        let (tx, rx) = mpsc::channel();
        pump_records(Cursor::new(b"AAAA\xff\n".to_vec()), &tx);
        drop(tx);

        match rx.recv().unwrap() {
            Record::Output(text) => assert!(text.starts_with("AAAA")),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn test_spawn_missing_program()
    {
        let config = SessionConfig {
            gdb_path: "/nonexistent/pwnview-gdb".into(),
            ..SessionConfig::default()
        };
        match GdbProcess::spawn(&config) {
            Err(SessionError::Spawn { program, .. }) => assert_eq!(program, "/nonexistent/pwnview-gdb"),
            other => panic!("expected spawn error, got {:?}", other.map(|(process, ..)| process.id())),
        }
    }
}
